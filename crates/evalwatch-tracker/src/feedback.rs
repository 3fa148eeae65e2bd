//! Optimistic, write-through feedback for the requirement rows of one evaluation.
//!
//! Local state is updated first and each interaction dispatches one upsert
//! carrying the full (`is_helpful`, `comment`) pair as it stands at dispatch.
//! Writes for the same row may be in flight concurrently and acknowledge in
//! any order; because every body is complete, the store converges on the pair
//! of whichever write it applied last, and the local row never waits on it.
//!
//! The reconciler is owned by one task. A [`FeedbackWrite`] owns everything it
//! needs, so it can be sent from another task; its [`WriteAck`] is fed back
//! through [`FeedbackReconciler::acknowledge`].

use std::collections::BTreeMap;
use std::sync::Arc;

use evalwatch_core::{EvaluationService, FeedbackRecord, FeedbackUpsert, ServiceError, Vote};
use tracing::{debug, warn};

use crate::error::UpsertError;

/// Local feedback state for one requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackRow {
    pub is_helpful: Option<bool>,
    pub comment: Option<String>,
    /// Sequence number of the most recent dispatch.
    seq: u64,
    /// Writes dispatched but not yet acknowledged.
    outstanding: u32,
    /// Highest sequence number acknowledged as stored.
    newest_ok: u64,
    error: Option<(u64, UpsertError)>,
}

impl FeedbackRow {
    fn from_record(record: FeedbackRecord) -> Self {
        Self {
            is_helpful: record.is_helpful,
            comment: record.comment,
            ..Default::default()
        }
    }

    pub fn value(&self) -> FeedbackUpsert {
        FeedbackUpsert {
            is_helpful: self.is_helpful,
            comment: self.comment.clone(),
        }
    }

    pub fn is_saving(&self) -> bool {
        self.outstanding > 0
    }

    /// The last write failure, until a newer write succeeds.
    pub fn error(&self) -> Option<&UpsertError> {
        self.error.as_ref().map(|(_, err)| err)
    }
}

/// One dispatched upsert, ready to be sent.
#[derive(Clone)]
pub struct FeedbackWrite {
    service: Arc<dyn EvaluationService>,
    evaluation_id: String,
    pub requirement_id: String,
    pub seq: u64,
    pub body: FeedbackUpsert,
}

impl std::fmt::Debug for FeedbackWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackWrite")
            .field("evaluation_id", &self.evaluation_id)
            .field("requirement_id", &self.requirement_id)
            .field("seq", &self.seq)
            .field("body", &self.body)
            .finish()
    }
}

impl FeedbackWrite {
    pub async fn send(self) -> WriteAck {
        let result = self
            .service
            .upsert_feedback(&self.evaluation_id, &self.requirement_id, &self.body)
            .await;
        WriteAck {
            requirement_id: self.requirement_id,
            seq: self.seq,
            result,
        }
    }
}

/// Outcome of one [`FeedbackWrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    pub requirement_id: String,
    pub seq: u64,
    pub result: Result<(), ServiceError>,
}

pub struct FeedbackReconciler {
    service: Arc<dyn EvaluationService>,
    evaluation_id: String,
    rows: BTreeMap<String, FeedbackRow>,
    warning: Option<String>,
}

impl FeedbackReconciler {
    /// A reconciler with no stored feedback.
    pub fn empty(service: Arc<dyn EvaluationService>, evaluation_id: impl Into<String>) -> Self {
        Self {
            service,
            evaluation_id: evaluation_id.into(),
            rows: BTreeMap::new(),
            warning: None,
        }
    }

    /// Load stored feedback once for a view of `evaluation_id`.
    ///
    /// Never fails: an unusable response yields empty rows and a single warning.
    pub async fn load(service: Arc<dyn EvaluationService>, evaluation_id: impl Into<String>) -> Self {
        let evaluation_id = evaluation_id.into();
        match Self::try_load(Arc::clone(&service), evaluation_id.clone()).await {
            Ok(reconciler) => reconciler,
            Err(err) => {
                warn!(%evaluation_id, error = %err, "could not load feedback, starting empty");
                let mut reconciler = Self::empty(service, evaluation_id);
                reconciler.warning = Some(format!("existing feedback could not be loaded: {err}"));
                reconciler
            }
        }
    }

    /// Load stored feedback, failing when it cannot be read.
    ///
    /// Writers must use this: a vote or comment applied to empty rows would
    /// overwrite the other half of the stored pair with `null`.
    pub async fn try_load(
        service: Arc<dyn EvaluationService>,
        evaluation_id: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let mut reconciler = Self::empty(service, evaluation_id);
        let records = reconciler.service.list_feedback(&reconciler.evaluation_id).await?;
        debug!(
            evaluation_id = %reconciler.evaluation_id,
            count = records.len(),
            "loaded feedback"
        );
        for record in records {
            reconciler
                .rows
                .insert(record.requirement_id.clone(), FeedbackRow::from_record(record));
        }
        Ok(reconciler)
    }

    pub fn evaluation_id(&self) -> &str {
        &self.evaluation_id
    }

    pub fn row(&self, requirement_id: &str) -> Option<&FeedbackRow> {
        self.rows.get(requirement_id)
    }

    /// Current local pair for a requirement; `null`/`null` when untouched.
    pub fn value(&self, requirement_id: &str) -> FeedbackUpsert {
        self.rows
            .get(requirement_id)
            .map(FeedbackRow::value)
            .unwrap_or_default()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &FeedbackRow)> {
        self.rows.iter().map(|(id, row)| (id.as_str(), row))
    }

    /// The load warning, returned at most once.
    pub fn take_warning(&mut self) -> Option<String> {
        self.warning.take()
    }

    /// Toggle a vote locally and dispatch the resulting pair.
    pub fn vote(&mut self, requirement_id: &str, vote: Vote) -> FeedbackWrite {
        let row = self.rows.entry(requirement_id.to_string()).or_default();
        row.is_helpful = vote.apply(row.is_helpful);
        self.dispatch(requirement_id)
    }

    /// Replace the comment locally and dispatch the resulting pair.
    ///
    /// Whitespace-only text clears the comment.
    pub fn set_comment(&mut self, requirement_id: &str, text: &str) -> FeedbackWrite {
        let row = self.rows.entry(requirement_id.to_string()).or_default();
        let trimmed = text.trim();
        row.comment = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self.dispatch(requirement_id)
    }

    fn dispatch(&mut self, requirement_id: &str) -> FeedbackWrite {
        let row = self.rows.entry(requirement_id.to_string()).or_default();
        row.seq += 1;
        row.outstanding += 1;
        debug!(
            evaluation_id = %self.evaluation_id,
            requirement_id,
            seq = row.seq,
            is_helpful = ?row.is_helpful,
            "dispatching feedback"
        );
        FeedbackWrite {
            service: Arc::clone(&self.service),
            evaluation_id: self.evaluation_id.clone(),
            requirement_id: requirement_id.to_string(),
            seq: row.seq,
            body: row.value(),
        }
    }

    /// Apply the outcome of a write. Local values are never rolled back.
    ///
    /// Returns the error now shown on the row, if this ack raised one.
    pub fn acknowledge(&mut self, ack: WriteAck) -> Option<UpsertError> {
        let row = self.rows.get_mut(&ack.requirement_id)?;
        row.outstanding = row.outstanding.saturating_sub(1);
        match ack.result {
            Ok(()) => {
                row.newest_ok = row.newest_ok.max(ack.seq);
                if row.error.as_ref().is_some_and(|(seq, _)| *seq <= ack.seq) {
                    row.error = None;
                }
                None
            }
            // The store already holds a pair at least as fresh as this one.
            Err(err) if ack.seq < row.newest_ok => {
                debug!(
                    requirement_id = %ack.requirement_id,
                    seq = ack.seq,
                    error = %err,
                    "ignoring stale feedback failure"
                );
                None
            }
            Err(source) => {
                let err = UpsertError {
                    requirement_id: ack.requirement_id,
                    source,
                };
                warn!(
                    evaluation_id = %self.evaluation_id,
                    requirement_id = %err.requirement_id,
                    error = %err.source,
                    "feedback not saved"
                );
                row.error = Some((ack.seq, err.clone()));
                Some(err)
            }
        }
    }

    /// Vote, send and acknowledge in one step.
    pub async fn vote_and_sync(&mut self, requirement_id: &str, vote: Vote) -> Result<(), UpsertError> {
        let ack = self.vote(requirement_id, vote).send().await;
        self.settle(ack)
    }

    /// Set a comment, send and acknowledge in one step.
    pub async fn comment_and_sync(&mut self, requirement_id: &str, text: &str) -> Result<(), UpsertError> {
        let ack = self.set_comment(requirement_id, text).send().await;
        self.settle(ack)
    }

    fn settle(&mut self, ack: WriteAck) -> Result<(), UpsertError> {
        match self.acknowledge(ack) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
