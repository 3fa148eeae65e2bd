//! Status poller: one timer-driven state machine per evaluation job.
//!
//! ```text
//! Idle ──start──▶ Polling ──▶ Completed | Failed | TimedOut | Cancelled
//! ```
//!
//! [`PollMachine`] holds every transition rule and is driven with explicit
//! instants, so it can be exercised without a runtime. [`start_polling`] runs
//! it on a tokio task with one interval timer, at most one status query in
//! flight, and a cancellation token that makes late responses inert.

use std::sync::Arc;

use evalwatch_core::{EvaluationJob, EvaluationService, JobStatus, ProgressView, ServiceError, merge};
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::error::{JobError, TimeoutReason, TransientQueryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Polling)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How polling for a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed {
        job: EvaluationJob,
        progress: ProgressView,
    },
    Failed {
        job: EvaluationJob,
        progress: ProgressView,
        error_message: String,
    },
    /// Local budget exhausted; the remote job may still be running.
    TimedOut {
        reason: TimeoutReason,
        progress: ProgressView,
        last_error: Option<TransientQueryError>,
    },
    Cancelled,
}

impl PollOutcome {
    pub fn state(&self) -> PollState {
        match self {
            Self::Completed { .. } => PollState::Completed,
            Self::Failed { .. } => PollState::Failed,
            Self::TimedOut { .. } => PollState::TimedOut,
            Self::Cancelled => PollState::Cancelled,
        }
    }

    pub fn progress(&self) -> Option<&ProgressView> {
        match self {
            Self::Completed { progress, .. }
            | Self::Failed { progress, .. }
            | Self::TimedOut { progress, .. } => Some(progress),
            Self::Cancelled => None,
        }
    }

    /// The completed job, or the job-level error describing why there is none.
    pub fn into_result(self) -> Result<EvaluationJob, JobError> {
        match self {
            Self::Completed { job, .. } => Ok(job),
            Self::Failed { error_message, .. } => Err(JobError::TerminalJob {
                message: error_message,
            }),
            Self::TimedOut {
                reason, last_error, ..
            } => Err(JobError::ClientTimeout { reason, last_error }),
            Self::Cancelled => Err(JobError::Cancelled),
        }
    }
}

/// Notification delivered to a poller subscriber.
///
/// A subscriber sees zero or more `Progress` updates followed by exactly one
/// `Finished`, unless the poller is cancelled, in which case nothing further
/// is delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum PollUpdate {
    Progress {
        status: JobStatus,
        progress: ProgressView,
    },
    Finished(PollOutcome),
}

impl PollUpdate {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// What the driver should do on a timer tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    /// Issue one status query.
    Query,
    /// A query is still outstanding; let this tick pass.
    Skip,
    /// Polling ended on this tick.
    Finish(PollOutcome),
    /// The machine is not polling; nothing to do.
    Inert,
}

/// Transition rules for tracking one job.
#[derive(Debug)]
pub struct PollMachine {
    evaluation_id: String,
    config: PollConfig,
    state: PollState,
    status: JobStatus,
    progress: ProgressView,
    idle_polls: u32,
    started_at: Option<Instant>,
    in_flight: bool,
    queries: u32,
    skipped_ticks: u32,
    last_error: Option<TransientQueryError>,
}

impl PollMachine {
    pub fn new(evaluation_id: impl Into<String>, config: PollConfig) -> Self {
        Self {
            evaluation_id: evaluation_id.into(),
            config,
            state: PollState::Idle,
            status: JobStatus::Pending,
            progress: ProgressView::default(),
            idle_polls: 0,
            started_at: None,
            in_flight: false,
            queries: 0,
            skipped_ticks: 0,
            last_error: None,
        }
    }

    pub fn evaluation_id(&self) -> &str {
        &self.evaluation_id
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> &ProgressView {
        &self.progress
    }

    pub fn idle_polls(&self) -> u32 {
        self.idle_polls
    }

    pub fn queries_issued(&self) -> u32 {
        self.queries
    }

    pub fn skipped_ticks(&self) -> u32 {
        self.skipped_ticks
    }

    /// Enter `Polling`. Only the first call has any effect.
    pub fn start(&mut self, now: Instant) {
        if self.state == PollState::Idle {
            self.state = PollState::Polling;
            self.started_at = Some(now);
            info!(evaluation_id = %self.evaluation_id, "polling started");
        }
    }

    /// Move to `Cancelled` unless already terminal. Returns whether it moved.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = PollState::Cancelled;
        self.in_flight = false;
        info!(evaluation_id = %self.evaluation_id, "polling cancelled");
        true
    }

    pub fn on_tick(&mut self, now: Instant) -> TickAction {
        if self.state != PollState::Polling {
            return TickAction::Inert;
        }
        if let Some(outcome) = self.check_budget(now) {
            return TickAction::Finish(outcome);
        }
        if self.in_flight {
            self.skipped_ticks += 1;
            debug!(evaluation_id = %self.evaluation_id, "query still in flight, skipping tick");
            return TickAction::Skip;
        }
        self.in_flight = true;
        self.queries += 1;
        TickAction::Query
    }

    /// Apply a status query result. Returns the update to publish, if any.
    ///
    /// Responses arriving outside `Polling` (after cancellation or a terminal
    /// transition) are discarded.
    pub fn on_response(
        &mut self,
        response: Result<EvaluationJob, ServiceError>,
        now: Instant,
    ) -> Option<PollUpdate> {
        if self.state != PollState::Polling {
            debug!(
                evaluation_id = %self.evaluation_id,
                state = self.state.as_str(),
                "discarding late status response"
            );
            return None;
        }
        self.in_flight = false;

        let job = match response {
            Ok(job) => job,
            Err(source) => {
                let consecutive = self.last_error.as_ref().map_or(0, |e| e.consecutive) + 1;
                warn!(
                    evaluation_id = %self.evaluation_id,
                    consecutive,
                    error = %source,
                    "status query failed, retrying next tick"
                );
                self.last_error = Some(TransientQueryError {
                    consecutive,
                    source,
                });
                return self.check_budget(now).map(PollUpdate::Finished);
            }
        };
        self.last_error = None;

        let previous = self.progress.clone();
        if job.has_progress() {
            self.progress = merge(&previous, &job.fragment());
        }
        let previous_status = self.status;
        self.status = self.status.advance(job.status);

        if job.status.is_terminal() {
            return Some(PollUpdate::Finished(self.finish_terminal(job)));
        }

        if let Some(outcome) = self.check_budget(now) {
            return Some(PollUpdate::Finished(outcome));
        }

        if self.progress.advanced_from(&previous) {
            self.idle_polls = 0;
        } else {
            self.idle_polls += 1;
            if self.idle_polls > self.config.idle_cap {
                let reason = TimeoutReason::IdleCap {
                    idle_polls: self.idle_polls,
                };
                return Some(PollUpdate::Finished(self.time_out(reason)));
            }
        }

        if self.progress != previous || self.status != previous_status {
            Some(PollUpdate::Progress {
                status: self.status,
                progress: self.progress.clone(),
            })
        } else {
            None
        }
    }

    fn finish_terminal(&mut self, job: EvaluationJob) -> PollOutcome {
        let progress = self.progress.clone();
        if job.status == JobStatus::Completed {
            self.state = PollState::Completed;
            info!(
                evaluation_id = %self.evaluation_id,
                queries = self.queries,
                score = ?job.overall_compliance_score,
                "evaluation completed"
            );
            PollOutcome::Completed { job, progress }
        } else {
            self.state = PollState::Failed;
            let error_message = job
                .error_message
                .clone()
                .unwrap_or_else(|| "the evaluation service reported a failure".to_string());
            warn!(evaluation_id = %self.evaluation_id, error = %error_message, "evaluation failed");
            PollOutcome::Failed {
                job,
                progress,
                error_message,
            }
        }
    }

    /// The wall-clock budget check. Runs before the idle check so it wins when both fire.
    fn check_budget(&mut self, now: Instant) -> Option<PollOutcome> {
        let started = self.started_at?;
        let elapsed = now.saturating_duration_since(started);
        if elapsed > self.config.max_duration {
            Some(self.time_out(TimeoutReason::MaxDuration { elapsed }))
        } else {
            None
        }
    }

    fn time_out(&mut self, reason: TimeoutReason) -> PollOutcome {
        self.state = PollState::TimedOut;
        self.in_flight = false;
        warn!(
            evaluation_id = %self.evaluation_id,
            %reason,
            "could not confirm completion, stopped polling"
        );
        PollOutcome::TimedOut {
            reason,
            progress: self.progress.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

type StatusQuery = BoxFuture<'static, Result<EvaluationJob, ServiceError>>;

/// Handle to a running poller.
///
/// Dropping the handle cancels the poller.
pub struct PollHandle {
    evaluation_id: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    pub fn evaluation_id(&self) -> &str {
        &self.evaluation_id
    }

    /// Request cancellation without waiting for the task to wind down.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for polling to end on its own.
    pub async fn wait(mut self) -> PollOutcome {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(PollOutcome::Cancelled),
            None => PollOutcome::Cancelled,
        }
    }

    /// Cancel and wait. Once this resolves the subscriber will not be called again.
    pub async fn stop(self) -> PollOutcome {
        self.cancel.cancel();
        self.wait().await
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start polling `evaluation_id` on a new task.
///
/// `on_update` is called from the polling task; see [`PollUpdate`] for the
/// delivery contract.
pub fn start_polling<F>(
    service: Arc<dyn EvaluationService>,
    evaluation_id: impl Into<String>,
    config: PollConfig,
    on_update: F,
) -> PollHandle
where
    F: FnMut(PollUpdate) + Send + 'static,
{
    let evaluation_id = evaluation_id.into();
    let cancel = CancellationToken::new();
    let machine = PollMachine::new(evaluation_id.clone(), config);
    let task = tokio::spawn(drive(machine, service, cancel.clone(), on_update));
    PollHandle {
        evaluation_id,
        cancel,
        task: Some(task),
    }
}

async fn drive<F>(
    mut machine: PollMachine,
    service: Arc<dyn EvaluationService>,
    cancel: CancellationToken,
    mut on_update: F,
) -> PollOutcome
where
    F: FnMut(PollUpdate) + Send + 'static,
{
    let mut ticker = tokio::time::interval(machine.config().interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    machine.start(Instant::now());

    let mut in_flight: Option<StatusQuery> = None;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                // Dropping the query future discards whatever it would have returned.
                drop(in_flight.take());
                machine.cancel();
                return PollOutcome::Cancelled;
            }

            response = resolve(&mut in_flight) => {
                in_flight = None;
                let Some(update) = machine.on_response(response, Instant::now()) else {
                    continue;
                };
                if cancel.is_cancelled() {
                    machine.cancel();
                    return PollOutcome::Cancelled;
                }
                match update {
                    PollUpdate::Finished(outcome) => {
                        on_update(PollUpdate::Finished(outcome.clone()));
                        return outcome;
                    }
                    progress => on_update(progress),
                }
            }

            _ = ticker.tick() => {
                match machine.on_tick(Instant::now()) {
                    TickAction::Query => {
                        let service = Arc::clone(&service);
                        let id = machine.evaluation_id().to_string();
                        in_flight = Some(Box::pin(async move { service.get_job_status(&id).await }));
                    }
                    TickAction::Skip => {}
                    TickAction::Finish(outcome) => {
                        on_update(PollUpdate::Finished(outcome.clone()));
                        return outcome;
                    }
                    TickAction::Inert => return PollOutcome::Cancelled,
                }
            }
        }
    }
}

/// Resolve the outstanding query, or never resolve when there is none.
async fn resolve(in_flight: &mut Option<StatusQuery>) -> Result<EvaluationJob, ServiceError> {
    match in_flight {
        Some(query) => query.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::fake::{FakeService, job};

    fn config(interval_secs: u64, idle_cap: u32, max_secs: u64) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(interval_secs),
            idle_cap,
            max_duration: Duration::from_secs(max_secs),
        }
    }

    fn collector() -> (Arc<Mutex<Vec<PollUpdate>>>, impl FnMut(PollUpdate) + Send + 'static) {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        (updates, move |u| sink.lock().unwrap().push(u))
    }

    fn finished_count(updates: &[PollUpdate]) -> usize {
        updates.iter().filter(|u| u.is_finished()).count()
    }

    // ── PollMachine, no runtime timers ──

    #[test]
    fn machine_requires_start() {
        let mut m = PollMachine::new("e", PollConfig::default());
        assert_eq!(m.on_tick(Instant::now()), TickAction::Inert);
        assert_eq!(m.state(), PollState::Idle);
    }

    #[test]
    fn machine_suppresses_overlapping_queries() {
        let mut m = PollMachine::new("e", PollConfig::default());
        let t0 = Instant::now();
        m.start(t0);
        assert_eq!(m.on_tick(t0), TickAction::Query);
        assert_eq!(m.on_tick(t0 + Duration::from_secs(5)), TickAction::Skip);
        assert_eq!(m.skipped_ticks(), 1);
        m.on_response(Ok(job(JobStatus::InProgress, Some((1, 38)))), t0 + Duration::from_secs(6));
        assert_eq!(m.on_tick(t0 + Duration::from_secs(10)), TickAction::Query);
        assert_eq!(m.queries_issued(), 2);
    }

    #[test]
    fn machine_ignores_responses_after_cancel() {
        let mut m = PollMachine::new("e", PollConfig::default());
        let t0 = Instant::now();
        m.start(t0);
        assert_eq!(m.on_tick(t0), TickAction::Query);
        assert!(m.cancel());
        let late = m.on_response(Ok(job(JobStatus::Completed, Some((38, 38)))), t0);
        assert!(late.is_none());
        assert_eq!(m.state(), PollState::Cancelled);
        assert_eq!(m.progress().completed_requirements, 0);
        assert!(!m.cancel(), "cancelling twice is a no-op");
    }

    #[test]
    fn machine_status_never_regresses() {
        let mut m = PollMachine::new("e", PollConfig::default());
        let t0 = Instant::now();
        m.start(t0);
        m.on_tick(t0);
        m.on_response(Ok(job(JobStatus::InProgress, Some((2, 38)))), t0);
        m.on_tick(t0);
        m.on_response(Ok(job(JobStatus::Pending, None)), t0);
        assert_eq!(m.status(), JobStatus::InProgress);
    }

    #[test]
    fn transient_errors_do_not_count_as_idle() {
        let mut m = PollMachine::new("e", config(5, 1, 600));
        let t0 = Instant::now();
        m.start(t0);
        for i in 0..10 {
            let now = t0 + Duration::from_secs(5 * i);
            assert_eq!(m.on_tick(now), TickAction::Query);
            let update = m.on_response(Err(ServiceError::Transport("reset".into())), now);
            assert!(update.is_none());
        }
        assert_eq!(m.idle_polls(), 0);
        assert_eq!(m.state(), PollState::Polling);
    }

    #[test]
    fn budget_dominates_idle_cap_on_the_same_response() {
        let mut m = PollMachine::new("e", config(5, 0, 10));
        let t0 = Instant::now();
        m.start(t0);
        m.on_tick(t0);
        // Unchanged progress would trip the idle cap of 0, but the budget is also gone.
        let update = m.on_response(Ok(job(JobStatus::Pending, None)), t0 + Duration::from_secs(11));
        match update {
            Some(PollUpdate::Finished(PollOutcome::TimedOut { reason, .. })) => {
                assert!(matches!(reason, TimeoutReason::MaxDuration { .. }));
            }
            other => panic!("expected max-duration timeout, got {other:?}"),
        }
    }

    #[test]
    fn terminal_response_merges_final_metadata() {
        let mut m = PollMachine::new("e", PollConfig::default());
        let t0 = Instant::now();
        m.start(t0);
        m.on_tick(t0);
        let update = m.on_response(Ok(job(JobStatus::Completed, Some((38, 38)))), t0);
        match update {
            Some(PollUpdate::Finished(PollOutcome::Completed { progress, .. })) => {
                assert_eq!(progress.completed_requirements, 38);
                assert_eq!(progress.progress_percent, 100);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(m.on_tick(t0 + Duration::from_secs(5)), TickAction::Inert);
    }

    // ── Driven poller, paused clock ──

    #[tokio::test(start_paused = true)]
    async fn out_of_order_progress_then_completion() {
        let mut done = job(JobStatus::Completed, None);
        done.outcomes.passed = Some(30);
        done.outcomes.failed = Some(8);
        let fake = Arc::new(FakeService::with_statuses(vec![
            Ok(job(JobStatus::Pending, None)),
            Ok(job(JobStatus::InProgress, Some((5, 38)))),
            Ok(job(JobStatus::InProgress, Some((3, 38)))),
            Ok(done),
        ]));
        let (updates, on_update) = collector();

        let handle = start_polling(fake.clone(), "eval-1", config(5, 120, 1800), on_update);
        let outcome = handle.wait().await;

        let updates = updates.lock().unwrap();
        let mut last_completed = 0;
        for update in updates.iter() {
            if let PollUpdate::Progress { progress, .. } = update {
                assert!(progress.completed_requirements >= last_completed);
                assert_ne!(progress.completed_requirements, 3);
                last_completed = progress.completed_requirements;
            }
        }
        assert_eq!(finished_count(&updates), 1);
        assert!(updates.last().unwrap().is_finished());
        match outcome {
            PollOutcome::Completed { job, progress } => {
                assert_eq!(job.outcomes.passed, Some(30));
                assert_eq!(progress.completed_requirements, 5);
                assert_eq!(progress.total_requirements, 38);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(fake.queries(), 4);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fake.queries(), 4, "no queries after a terminal state");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_job_times_out_on_the_121st_poll() {
        let fake = Arc::new(FakeService::with_statuses(vec![Ok(job(
            JobStatus::InProgress,
            Some((0, 38)),
        ))]));
        let (updates, on_update) = collector();

        let handle = start_polling(fake.clone(), "eval-1", config(5, 120, 1800), on_update);
        let outcome = handle.wait().await;

        match &outcome {
            PollOutcome::TimedOut { reason, .. } => {
                assert_eq!(*reason, TimeoutReason::IdleCap { idle_polls: 121 });
            }
            other => panic!("expected idle timeout, got {other:?}"),
        }
        assert_eq!(fake.queries(), 121);
        assert_eq!(finished_count(&updates.lock().unwrap()), 1);
        assert!(matches!(
            outcome.into_result(),
            Err(JobError::ClientTimeout { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn max_duration_wins_when_both_budgets_expire() {
        let fake = Arc::new(FakeService::with_statuses(vec![Ok(job(
            JobStatus::InProgress,
            Some((1, 38)),
        ))]));
        // Queries take 1s: ticks at 0/5/10s, responses at 1/6/11s.
        fake.set_status_delay(Duration::from_secs(1));
        let cfg = PollConfig {
            interval: Duration::from_secs(5),
            idle_cap: 1,
            max_duration: Duration::from_millis(10_500),
        };
        let (_updates, on_update) = collector();

        let outcome = start_polling(fake.clone(), "eval-1", cfg, on_update)
            .wait()
            .await;
        match outcome {
            PollOutcome::TimedOut { reason, .. } => {
                assert!(matches!(reason, TimeoutReason::MaxDuration { .. }));
            }
            other => panic!("expected max-duration timeout, got {other:?}"),
        }
        assert_eq!(fake.queries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_query_errors_exhaust_the_duration_budget() {
        let fake = Arc::new(FakeService::with_statuses(vec![Err(ServiceError::Transport(
            "connection refused".into(),
        ))]));
        let (_updates, on_update) = collector();

        let outcome = start_polling(fake.clone(), "eval-1", config(5, 2, 30), on_update)
            .wait()
            .await;
        match outcome {
            PollOutcome::TimedOut {
                reason, last_error, ..
            } => {
                assert!(matches!(reason, TimeoutReason::MaxDuration { .. }));
                let last_error = last_error.expect("last query error is reported");
                assert!(last_error.consecutive >= 6);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_completion() {
        let fake = Arc::new(FakeService::with_statuses(vec![
            Err(ServiceError::Transport("reset".into())),
            Err(ServiceError::Server {
                status: 502,
                body: String::new(),
            }),
            Err(ServiceError::Transport("reset".into())),
            Ok(job(JobStatus::Completed, Some((38, 38)))),
        ]));
        let (updates, on_update) = collector();

        let outcome = start_polling(fake.clone(), "eval-1", config(5, 1, 600), on_update)
            .wait()
            .await;
        assert_eq!(outcome.state(), PollState::Completed);
        assert_eq!(fake.queries(), 4);
        assert_eq!(updates.lock().unwrap().len(), 1, "errors are not published");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_surfaces_error_message() {
        let mut failed = job(JobStatus::Failed, None);
        failed.error_message = Some("Vision evaluator currently supports PDF files only".into());
        let fake = Arc::new(FakeService::with_statuses(vec![
            Ok(job(JobStatus::InProgress, Some((1, 38)))),
            Ok(failed),
        ]));
        let (updates, on_update) = collector();

        let outcome = start_polling(fake.clone(), "eval-1", config(5, 120, 1800), on_update)
            .wait()
            .await;
        assert_eq!(finished_count(&updates.lock().unwrap()), 1);
        assert_eq!(
            outcome.into_result(),
            Err(JobError::TerminalJob {
                message: "Vision evaluator currently supports PDF files only".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_query_in_flight() {
        let fake = Arc::new(FakeService::with_statuses(vec![Ok(job(
            JobStatus::InProgress,
            Some((1, 38)),
        ))]));
        // Slower than the interval: ticks at 5s and 10s find the first query pending.
        fake.set_status_delay(Duration::from_secs(12));
        let (_updates, on_update) = collector();

        let handle = start_polling(fake.clone(), "eval-1", config(5, 120, 1800), on_update);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fake.max_in_flight(), 1);
        assert_eq!(fake.queries(), 2);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_poller_ignores_in_flight_response() {
        let fake = Arc::new(FakeService::with_statuses(vec![Ok(job(
            JobStatus::Completed,
            Some((38, 38)),
        ))]));
        fake.set_status_delay(Duration::from_secs(3));
        let (updates, on_update) = collector();

        let handle = start_polling(fake.clone(), "eval-1", config(5, 120, 1800), on_update);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fake.queries(), 1, "first query is in flight");

        let outcome = handle.stop().await;
        assert_eq!(outcome, PollOutcome::Cancelled);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(updates.lock().unwrap().is_empty());
        assert_eq!(fake.queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let fake = Arc::new(FakeService::with_statuses(vec![Ok(job(
            JobStatus::InProgress,
            Some((1, 38)),
        ))]));
        let (updates, on_update) = collector();

        let handle = start_polling(fake.clone(), "eval-1", config(5, 120, 1800), on_update);
        tokio::time::sleep(Duration::from_secs(7)).await;
        let seen = fake.queries();
        drop(handle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fake.queries(), seen);
        assert_eq!(finished_count(&updates.lock().unwrap()), 0);
    }
}
