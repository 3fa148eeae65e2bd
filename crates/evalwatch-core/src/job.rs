//! Evaluation job records as reported by the evaluation service.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::progress::ProgressFragment;

/// Lifecycle status of an evaluation job.
///
/// Status only ever moves forward: `pending → in_progress → {completed, failed}`.
/// Use [`advance`](Self::advance) to fold a new observation into a tracked status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    #[serde(alias = "queued")]
    Pending,
    #[serde(alias = "processing", alias = "running")]
    InProgress,
    Completed,
    /// The backend historically wrote `error` for failed jobs.
    #[serde(alias = "error")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Fold an observed status into this one without ever moving backwards.
    ///
    /// A terminal status is final: neither a late non-terminal observation nor
    /// the other terminal status replaces it.
    pub fn advance(self, observed: JobStatus) -> JobStatus {
        if self.is_terminal() || observed.rank() < self.rank() {
            self
        } else {
            observed
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Aggregate per-requirement outcome counts carried on a job record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    #[serde(default, rename = "requirements_passed")]
    pub passed: Option<u32>,
    #[serde(default, rename = "requirements_failed")]
    pub failed: Option<u32>,
    /// `requirements_partial` is the legacy name for the same count.
    #[serde(
        default,
        rename = "requirements_flagged",
        alias = "requirements_partial"
    )]
    pub flagged: Option<u32>,
    #[serde(
        default,
        rename = "requirements_na",
        alias = "requirements_not_applicable"
    )]
    pub not_applicable: Option<u32>,
}

impl OutcomeCounts {
    /// Sum of every count that is present, or `None` when none are.
    pub fn known_total(&self) -> Option<u32> {
        [self.passed, self.failed, self.flagged, self.not_applicable]
            .into_iter()
            .flatten()
            .reduce(|a, b| a.saturating_add(b))
    }

    pub fn is_empty(&self) -> bool {
        self.known_total().is_none()
    }
}

/// Partially-populated progress payload written by the evaluation engine.
///
/// Every field is optional: a single poll may carry any subset of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_requirements: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_requirements: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_requirement_id: Option<String>,
    /// Position in the server's evaluation queue; 0 means processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
}

/// One observation of an evaluation job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationJob {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub status: JobStatus,
    /// ISO 8601 timestamp string, with or without an offset.
    #[serde(default)]
    pub created_at: Option<String>,
    /// ISO 8601 timestamp string, with or without an offset.
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Legacy top-level percent, superseded by `metadata.progress_percent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(default)]
    pub metadata: Option<ProgressMetadata>,
    #[serde(flatten)]
    pub outcomes: OutcomeCounts,
    #[serde(default)]
    pub overall_compliance_score: Option<f64>,
}

impl EvaluationJob {
    /// Extract the progress fragment carried by this observation.
    pub fn fragment(&self) -> ProgressFragment {
        let mut metadata = self.metadata.clone().unwrap_or_default();
        if metadata.progress_percent.is_none() {
            metadata.progress_percent = self.progress;
        }
        ProgressFragment {
            metadata,
            outcomes: self.outcomes,
        }
    }

    /// Whether this observation carries any progress information at all.
    pub fn has_progress(&self) -> bool {
        self.metadata.is_some() || self.progress.is_some() || !self.outcomes.is_empty()
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }

    pub fn completed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.completed_at.as_deref().and_then(parse_timestamp)
    }
}

/// Parse an ISO 8601 timestamp, treating offset-less values as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Acknowledgement returned when a document is accepted for evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub evaluation_id: String,
    #[serde(default, alias = "filename")]
    pub document_name: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub message: Option<String>,
}
