//! In-memory evaluation service for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use evalwatch_core::{
    ComplianceReport, DocumentUpload, EvaluationJob, EvaluationService, FeedbackRecord,
    FeedbackUpsert, JobStatus, JobTicket, ProgressMetadata, ServiceError,
};
use tokio::sync::oneshot;

type StatusScript = VecDeque<Result<EvaluationJob, ServiceError>>;

#[derive(Default)]
pub struct FakeService {
    /// Scripted status responses; the last one repeats once the script runs out.
    statuses: Mutex<StatusScript>,
    last_status: Mutex<Option<Result<EvaluationJob, ServiceError>>>,
    status_delay: Mutex<Duration>,
    queries: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,

    pub submit_result: Mutex<Option<Result<JobTicket, ServiceError>>>,
    pub submissions: AtomicU32,
    pub report: Mutex<Option<Result<ComplianceReport, ServiceError>>>,

    pub feedback_list: Mutex<Option<Result<Vec<FeedbackRecord>, ServiceError>>>,
    /// Stored feedback, written when an upsert arrives.
    pub feedback: Mutex<HashMap<String, FeedbackUpsert>>,
    /// Every upsert body in arrival order.
    pub upserts: Mutex<Vec<(String, FeedbackUpsert)>>,
    hold_acks: Mutex<bool>,
    pending_acks: Mutex<Vec<oneshot::Sender<Result<(), ServiceError>>>>,
    upsert_failure: Mutex<Option<ServiceError>>,
}

impl FakeService {
    pub fn with_statuses(script: Vec<Result<EvaluationJob, ServiceError>>) -> Self {
        let fake = Self::default();
        *fake.statuses.lock().unwrap() = script.into();
        fake
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }

    pub fn queries(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Upserts are recorded on arrival but acknowledged only via [`release_ack`](Self::release_ack).
    pub fn hold_acks(&self) {
        *self.hold_acks.lock().unwrap() = true;
    }

    pub fn held_acks(&self) -> usize {
        self.pending_acks.lock().unwrap().len()
    }

    /// Acknowledge the `index`-th held upsert (in arrival order).
    pub fn release_ack(&self, index: usize, result: Result<(), ServiceError>) {
        let mut pending = self.pending_acks.lock().unwrap();
        let (tx, _) = oneshot::channel();
        let sender = std::mem::replace(&mut pending[index], tx);
        let _ = sender.send(result);
    }

    pub fn fail_upserts(&self, err: Option<ServiceError>) {
        *self.upsert_failure.lock().unwrap() = err;
    }

    pub fn stored(&self, requirement_id: &str) -> Option<FeedbackUpsert> {
        self.feedback.lock().unwrap().get(requirement_id).cloned()
    }
}

#[async_trait]
impl EvaluationService for FakeService {
    async fn submit_job(
        &self,
        _upload: &DocumentUpload,
        _framework_id: &str,
    ) -> Result<JobTicket, ServiceError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.submit_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(ServiceError::Transport("no submit result scripted".into())))
    }

    async fn list_evaluations(&self) -> Result<Vec<EvaluationJob>, ServiceError> {
        Ok(vec![])
    }

    async fn get_job_status(&self, _evaluation_id: &str) -> Result<EvaluationJob, ServiceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.statuses.lock().unwrap().pop_front();
        let response = match next {
            Some(r) => {
                *self.last_status.lock().unwrap() = Some(r.clone());
                r
            }
            None => self
                .last_status
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(job(JobStatus::Pending, None))),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    async fn get_compliance_report(
        &self,
        _evaluation_id: &str,
    ) -> Result<ComplianceReport, ServiceError> {
        self.report
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(ServiceError::Server {
                status: 404,
                body: "No results found".into(),
            }))
    }

    async fn list_feedback(
        &self,
        _evaluation_id: &str,
    ) -> Result<Vec<FeedbackRecord>, ServiceError> {
        self.feedback_list
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(vec![]))
    }

    async fn upsert_feedback(
        &self,
        _evaluation_id: &str,
        requirement_id: &str,
        feedback: &FeedbackUpsert,
    ) -> Result<(), ServiceError> {
        if let Some(err) = self.upsert_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.feedback
            .lock()
            .unwrap()
            .insert(requirement_id.to_string(), feedback.clone());
        self.upserts
            .lock()
            .unwrap()
            .push((requirement_id.to_string(), feedback.clone()));

        if !*self.hold_acks.lock().unwrap() {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.pending_acks.lock().unwrap().push(tx);
        rx.await
            .unwrap_or_else(|_| Err(ServiceError::Transport("ack dropped".into())))
    }
}

/// A status observation with optional `completed/total` progress.
pub fn job(status: JobStatus, progress: Option<(u32, u32)>) -> EvaluationJob {
    EvaluationJob {
        id: "eval-1".into(),
        document_name: "risk_plan.pdf".into(),
        status,
        metadata: progress.map(|(done, total)| ProgressMetadata {
            completed_requirements: Some(done),
            total_requirements: Some(total),
            ..Default::default()
        }),
        ..Default::default()
    }
}
