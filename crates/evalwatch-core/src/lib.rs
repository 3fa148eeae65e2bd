pub mod clause_key;
pub mod feedback;
pub mod job;
pub mod progress;
pub mod requirement;
pub mod service;

pub use clause_key::normalize_clause;
pub use feedback::{FeedbackRecord, FeedbackUpsert, Vote};
pub use job::{EvaluationJob, JobStatus, JobTicket, OutcomeCounts, ProgressMetadata};
pub use progress::{DEFAULT_TOTAL_REQUIREMENTS, ProgressFragment, ProgressView, TotalSource, merge};
pub use requirement::{
    ComplianceReport, ConfidenceLevel, RequirementMetrics, RequirementResult, RequirementStatus,
    StatusTally,
};
pub use service::{DocumentUpload, EvaluationService, ServiceError};
