//! Keyed store of tracked jobs, mutated only through poller updates.

use std::collections::BTreeMap;

use evalwatch_core::{JobStatus, ProgressView};
use tracing::debug;

use crate::poller::{PollOutcome, PollState, PollUpdate};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJob {
    pub evaluation_id: String,
    pub document_name: String,
    pub state: PollState,
    pub status: JobStatus,
    pub progress: ProgressView,
    pub outcome: Option<PollOutcome>,
}

impl TrackedJob {
    fn new(evaluation_id: String, document_name: String) -> Self {
        Self {
            evaluation_id,
            document_name,
            state: PollState::Polling,
            status: JobStatus::Pending,
            progress: ProgressView::default(),
            outcome: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

/// All jobs tracked in one session, ordered by evaluation id.
#[derive(Debug, Default)]
pub struct JobBoard {
    jobs: BTreeMap<String, TrackedJob>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a job. Re-registering an id resets its entry.
    pub fn register(&mut self, evaluation_id: impl Into<String>, document_name: impl Into<String>) {
        let evaluation_id = evaluation_id.into();
        self.jobs.insert(
            evaluation_id.clone(),
            TrackedJob::new(evaluation_id, document_name.into()),
        );
    }

    /// Apply a poller update. Returns false when the update was ignored
    /// because the job is unknown or already finished.
    pub fn apply(&mut self, evaluation_id: &str, update: &PollUpdate) -> bool {
        let Some(job) = self.jobs.get_mut(evaluation_id) else {
            debug!(evaluation_id, "update for untracked job");
            return false;
        };
        if job.is_finished() {
            debug!(evaluation_id, "update after terminal state ignored");
            return false;
        }
        match update {
            PollUpdate::Progress { status, progress } => {
                job.status = *status;
                job.progress = progress.clone();
            }
            PollUpdate::Finished(outcome) => {
                job.state = outcome.state();
                if let Some(progress) = outcome.progress() {
                    job.progress = progress.clone();
                }
                match outcome {
                    PollOutcome::Completed { job: record, .. }
                    | PollOutcome::Failed { job: record, .. } => job.status = record.status,
                    PollOutcome::TimedOut { .. } | PollOutcome::Cancelled => {}
                }
                job.outcome = Some(outcome.clone());
            }
        }
        true
    }

    /// Record a cancellation requested locally; the poller itself stays silent.
    pub fn mark_cancelled(&mut self, evaluation_id: &str) -> bool {
        self.apply(evaluation_id, &PollUpdate::Finished(PollOutcome::Cancelled))
    }

    pub fn get(&self, evaluation_id: &str) -> Option<&TrackedJob> {
        self.jobs.get(evaluation_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedJob> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs still being polled.
    pub fn active_count(&self) -> usize {
        self.jobs.values().filter(|j| !j.is_finished()).count()
    }
}
