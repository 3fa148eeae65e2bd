//! Tracking layer: turns one long-running remote evaluation into a sequence of
//! locally consistent states, and writes human feedback back optimistically.

pub mod board;
pub mod config;
pub mod error;
pub mod feedback;
pub mod poller;
pub mod submission;

#[cfg(test)]
mod fake;

pub use board::{JobBoard, TrackedJob};
pub use config::{ConfigError, PollConfig};
pub use error::{JobError, SubmissionError, TimeoutReason, TransientQueryError, UpsertError};
pub use feedback::{FeedbackReconciler, FeedbackRow, FeedbackWrite, WriteAck};
pub use poller::{PollHandle, PollMachine, PollOutcome, PollState, PollUpdate, start_polling};
pub use submission::{SubmittedJob, fetch_report, read_upload, submit, validate_upload};
