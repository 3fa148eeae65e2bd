//! Progress merge: folds partial progress fragments into a non-regressing view.
//!
//! Poll responses can arrive out of order and any of them may omit fields, so
//! the tracked view is never replaced wholesale. Each field follows an explicit
//! policy:
//!
//! | Field                    | Policy                                                        |
//! |--------------------------|---------------------------------------------------------------|
//! | `completed_requirements` | `max(previous, fragment)`                                     |
//! | `progress_percent`       | `max(previous, fragment or derived from completed/total)`, ≤ 100 |
//! | `total_requirements`     | fragment → outcome count sum → previous observed → default    |
//! | `status_message`         | fragment when present, otherwise previous                     |
//! | batch fields, `last_requirement_id`, `queue_position` | fragment when present, otherwise previous |

use tracing::debug;

use crate::job::{OutcomeCounts, ProgressMetadata};

/// Requirement count assumed until the service reports one.
///
/// Matches the size of the ISO 14971 requirement catalogue the engine ships with.
pub const DEFAULT_TOTAL_REQUIREMENTS: u32 = 38;

/// A partial progress payload from a single poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressFragment {
    pub metadata: ProgressMetadata,
    pub outcomes: OutcomeCounts,
}

/// Where the view's `total_requirements` came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TotalSource {
    /// No observation yet; [`DEFAULT_TOTAL_REQUIREMENTS`] is in use.
    #[default]
    Default,
    /// Sum of the outcome counts on the job record.
    OutcomeCounts,
    /// Explicit `total_requirements` from progress metadata.
    Reported,
}

/// The locally consistent progress of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub completed_requirements: u32,
    pub progress_percent: u32,
    pub total_requirements: u32,
    pub total_source: TotalSource,
    pub status_message: Option<String>,
    pub batch_number: Option<u32>,
    pub batch_total: Option<u32>,
    pub batch_size: Option<u32>,
    pub last_requirement_id: Option<String>,
    pub queue_position: Option<u32>,
}

impl Default for ProgressView {
    fn default() -> Self {
        Self {
            completed_requirements: 0,
            progress_percent: 0,
            total_requirements: DEFAULT_TOTAL_REQUIREMENTS,
            total_source: TotalSource::Default,
            status_message: None,
            batch_number: None,
            batch_total: None,
            batch_size: None,
            last_requirement_id: None,
            queue_position: None,
        }
    }
}

impl ProgressView {
    /// True when either monotonic counter moved past `previous`.
    pub fn advanced_from(&self, previous: &ProgressView) -> bool {
        self.completed_requirements != previous.completed_requirements
            || self.progress_percent != previous.progress_percent
    }

    /// One-line human summary, e.g. `42% · 16/38 requirements · Batch 4 of 10`.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{}% · {}/{} requirements",
            self.progress_percent, self.completed_requirements, self.total_requirements
        );
        if let Some(message) = self.status_message.as_deref().filter(|m| !m.is_empty()) {
            line.push_str(" · ");
            line.push_str(message);
        } else if let (Some(n), Some(total)) = (self.batch_number, self.batch_total) {
            line.push_str(&format!(" · Batch {n} of {total}"));
        }
        match self.queue_position {
            Some(0) | None => {}
            Some(pos) => line.push_str(&format!(" · queue position {pos}")),
        }
        line
    }
}

/// Merge a newly received fragment into the previous view.
///
/// Pure: `previous` is not modified, and the same inputs always produce the
/// same output. See the module docs for the per-field policy.
pub fn merge(previous: &ProgressView, fragment: &ProgressFragment) -> ProgressView {
    let meta = &fragment.metadata;
    let (total_requirements, total_source) = resolve_total(previous, fragment);

    let completed_requirements = match meta.completed_requirements {
        Some(reported) if reported < previous.completed_requirements => {
            debug!(
                reported,
                kept = previous.completed_requirements,
                "discarding stale completed_requirements"
            );
            previous.completed_requirements
        }
        Some(reported) => reported,
        None => previous.completed_requirements,
    };

    let reported_percent = meta
        .progress_percent
        .or_else(|| {
            meta.completed_requirements
                .map(|done| percent_of(done, total_requirements))
        })
        .map(|p| p.min(100));
    let progress_percent = match reported_percent {
        Some(reported) if reported < previous.progress_percent => {
            debug!(
                reported,
                kept = previous.progress_percent,
                "discarding stale progress_percent"
            );
            previous.progress_percent
        }
        Some(reported) => reported,
        None => previous.progress_percent,
    };

    ProgressView {
        completed_requirements,
        progress_percent,
        total_requirements,
        total_source,
        status_message: meta
            .status_message
            .clone()
            .or_else(|| previous.status_message.clone()),
        batch_number: meta.batch_number.or(previous.batch_number),
        batch_total: meta.batch_total.or(previous.batch_total),
        batch_size: meta.batch_size.or(previous.batch_size),
        last_requirement_id: meta
            .last_requirement_id
            .clone()
            .or_else(|| previous.last_requirement_id.clone()),
        queue_position: meta.queue_position.or(previous.queue_position),
    }
}

fn resolve_total(previous: &ProgressView, fragment: &ProgressFragment) -> (u32, TotalSource) {
    if let Some(total) = fragment.metadata.total_requirements.filter(|t| *t > 0) {
        return (total, TotalSource::Reported);
    }
    if let Some(sum) = fragment.outcomes.known_total().filter(|s| *s > 0) {
        return (sum, TotalSource::OutcomeCounts);
    }
    if previous.total_source != TotalSource::Default {
        return (previous.total_requirements, previous.total_source);
    }
    (DEFAULT_TOTAL_REQUIREMENTS, TotalSource::Default)
}

fn percent_of(done: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let percent = (u64::from(done) * 100 / u64::from(total)).min(100);
    percent as u32
}
