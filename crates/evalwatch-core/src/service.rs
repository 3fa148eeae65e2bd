//! Contract with the remote evaluation service.
//!
//! The tracker only talks to the evaluation engine and its store through
//! [`EvaluationService`]. `evalwatch-client` provides the HTTP binding; tests
//! provide in-memory fakes.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::feedback::{FeedbackRecord, FeedbackUpsert};
use crate::job::{EvaluationJob, JobTicket};
use crate::requirement::ComplianceReport;

/// Failure of a single call to the evaluation service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// The service refused the request itself (4xx), as opposed to failing to answer.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Server { status, .. } if (400..500).contains(status))
    }
}

/// A document to be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }

    /// Lowercased file extension, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Remote operations consumed by the tracking layer.
///
/// `upsert_feedback` is idempotent per (evaluation, requirement): the body
/// always carries the full (vote, comment) pair.
#[async_trait]
pub trait EvaluationService: Send + Sync {
    /// Upload a document and start an evaluation against `framework_id`.
    async fn submit_job(
        &self,
        upload: &DocumentUpload,
        framework_id: &str,
    ) -> Result<JobTicket, ServiceError>;

    /// All known evaluations, newest first.
    async fn list_evaluations(&self) -> Result<Vec<EvaluationJob>, ServiceError>;

    async fn get_job_status(&self, evaluation_id: &str) -> Result<EvaluationJob, ServiceError>;

    async fn get_compliance_report(
        &self,
        evaluation_id: &str,
    ) -> Result<ComplianceReport, ServiceError>;

    async fn list_feedback(&self, evaluation_id: &str)
    -> Result<Vec<FeedbackRecord>, ServiceError>;

    async fn upsert_feedback(
        &self,
        evaluation_id: &str,
        requirement_id: &str,
        feedback: &FeedbackUpsert,
    ) -> Result<(), ServiceError>;
}
