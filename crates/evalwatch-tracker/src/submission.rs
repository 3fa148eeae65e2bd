//! Job submission: validate an upload, start the evaluation, hand back a job
//! that can be tracked.

use std::path::Path;
use std::sync::Arc;

use evalwatch_core::{ComplianceReport, DocumentUpload, EvaluationService, JobTicket};
use tracing::{info, warn};

use crate::config::PollConfig;
use crate::error::{JobError, SubmissionError};
use crate::poller::{PollHandle, PollOutcome, PollUpdate, start_polling};

/// File extensions the evaluation service accepts.
pub const ACCEPTED_EXTENSIONS: [&str; 2] = ["pdf", "docx"];

/// Reject uploads the service would refuse, before any network call.
pub fn validate_upload(upload: &DocumentUpload, framework_id: &str) -> Result<(), SubmissionError> {
    if upload.file_name.trim().is_empty() {
        return Err(SubmissionError::Validation("no file name provided".into()));
    }
    match upload.extension() {
        Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => {
            return Err(SubmissionError::Validation(format!(
                "{}: only PDF and DOCX files are supported",
                upload.file_name
            )));
        }
    }
    if upload.content.is_empty() {
        return Err(SubmissionError::Validation(format!(
            "{} is empty",
            upload.file_name
        )));
    }
    if framework_id.trim().is_empty() {
        return Err(SubmissionError::Validation(
            "a framework id is required".into(),
        ));
    }
    Ok(())
}

/// Read a document from disk into an upload named after the file.
pub async fn read_upload(path: &Path) -> Result<DocumentUpload, SubmissionError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| SubmissionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(DocumentUpload::new(file_name, content))
}

/// Submit `upload` for evaluation against `framework_id`.
///
/// Validation failures never reach the service. Service failures are returned
/// as-is; resubmitting is left to the caller.
pub async fn submit(
    service: Arc<dyn EvaluationService>,
    upload: &DocumentUpload,
    framework_id: &str,
) -> Result<SubmittedJob, SubmissionError> {
    validate_upload(upload, framework_id)?;

    let ticket = match service.submit_job(upload, framework_id).await {
        Ok(ticket) => ticket,
        Err(err) => {
            warn!(document = %upload.file_name, error = %err, "submission failed");
            return Err(err.into());
        }
    };
    if ticket.evaluation_id.trim().is_empty() {
        return Err(SubmissionError::Unavailable(
            evalwatch_core::ServiceError::Malformed("upload response has no evaluation id".into()),
        ));
    }
    info!(
        evaluation_id = %ticket.evaluation_id,
        document = %upload.file_name,
        framework_id,
        bytes = upload.content.len(),
        "evaluation submitted"
    );
    Ok(SubmittedJob { ticket, service })
}

/// An accepted submission, not yet being tracked.
pub struct SubmittedJob {
    pub ticket: JobTicket,
    service: Arc<dyn EvaluationService>,
}

impl SubmittedJob {
    pub fn evaluation_id(&self) -> &str {
        &self.ticket.evaluation_id
    }

    /// Start a poller bound to this job alone.
    pub fn track<F>(&self, config: PollConfig, on_update: F) -> PollHandle
    where
        F: FnMut(PollUpdate) + Send + 'static,
    {
        start_polling(
            Arc::clone(&self.service),
            self.ticket.evaluation_id.clone(),
            config,
            on_update,
        )
    }
}

/// Fetch per-requirement results for a job whose polling completed.
pub async fn fetch_report(
    service: &dyn EvaluationService,
    evaluation_id: &str,
    outcome: &PollOutcome,
) -> Result<ComplianceReport, JobError> {
    if !matches!(outcome, PollOutcome::Completed { .. }) {
        return Err(outcome.clone().into_result().err().unwrap_or(JobError::Cancelled));
    }
    service
        .get_compliance_report(evaluation_id)
        .await
        .map_err(JobError::Report)
}
