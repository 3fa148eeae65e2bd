use std::path::PathBuf;
use std::time::Duration;

use evalwatch_core::ServiceError;
use thiserror::Error;

/// A document could not be turned into a running evaluation.
///
/// Never retried automatically; resubmitting is a new user action.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("invalid submission: {0}")]
    Validation(String),

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("submission rejected: {0}")]
    Rejected(#[source] ServiceError),

    #[error("submission failed: {0}")]
    Unavailable(#[source] ServiceError),
}

impl From<ServiceError> for SubmissionError {
    fn from(err: ServiceError) -> Self {
        if err.is_rejection() {
            Self::Rejected(err)
        } else {
            Self::Unavailable(err)
        }
    }
}

/// A single status query failed. Retried on the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status query failed ({consecutive} in a row): {source}")]
pub struct TransientQueryError {
    pub consecutive: u32,
    #[source]
    pub source: ServiceError,
}

/// Why the local polling budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    /// More than `idle_cap` consecutive polls showed no progress.
    IdleCap { idle_polls: u32 },
    /// Wall-clock budget exceeded.
    MaxDuration { elapsed: Duration },
}

impl std::fmt::Display for TimeoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdleCap { idle_polls } => {
                write!(f, "no progress reported in {idle_polls} consecutive checks")
            }
            Self::MaxDuration { elapsed } => {
                write!(f, "stopped checking after {}s", elapsed.as_secs())
            }
        }
    }
}

/// Job-level outcome other than a completed evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The job itself reported `failed`; the message is the service's, verbatim.
    #[error("evaluation failed: {message}")]
    TerminalJob { message: String },

    /// Completion was not observed within the polling budget. The job may
    /// still be running remotely.
    #[error("could not confirm completion: {reason}")]
    ClientTimeout {
        reason: TimeoutReason,
        last_error: Option<TransientQueryError>,
    },

    #[error("status tracking was cancelled")]
    Cancelled,

    #[error("could not fetch results: {0}")]
    Report(#[source] ServiceError),
}

/// A feedback write failed. Localised to one requirement row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("saving feedback for {requirement_id} failed: {source}")]
pub struct UpsertError {
    pub requirement_id: String,
    #[source]
    pub source: ServiceError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_rejections_are_split_from_outages() {
        let rejected: SubmissionError = ServiceError::Server {
            status: 400,
            body: "Only PDF and DOCX files are supported".into(),
        }
        .into();
        assert!(matches!(rejected, SubmissionError::Rejected(_)));

        let outage: SubmissionError = ServiceError::Transport("connection refused".into()).into();
        assert!(matches!(outage, SubmissionError::Unavailable(_)));
    }

    #[test]
    fn timeout_is_not_worded_as_failure() {
        let err = JobError::ClientTimeout {
            reason: TimeoutReason::MaxDuration {
                elapsed: Duration::from_secs(1800),
            },
            last_error: None,
        };
        let text = err.to_string();
        assert_eq!(text, "could not confirm completion: stopped checking after 1800s");
        assert!(!text.contains("failed"));
    }
}
