//! Human correctness feedback on requirement results.

use serde::{Deserialize, Serialize};

/// A stored feedback record, unique per (evaluation, requirement).
///
/// `is_helpful` is tri-state: `None` means no opinion has been recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    #[serde(default, alias = "document_evaluation_id")]
    pub evaluation_id: String,
    pub requirement_id: String,
    #[serde(default)]
    pub is_helpful: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Body of an upsert: always the complete (vote, comment) pair.
///
/// Both fields are serialised even when `null` so that a write never leaves
/// the other field to whatever an earlier write happened to store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackUpsert {
    pub is_helpful: Option<bool>,
    pub comment: Option<String>,
}

/// Direction of a helpfulness vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vote {
    Up,
    Down,
}

impl Vote {
    pub fn as_bool(&self) -> bool {
        matches!(self, Self::Up)
    }

    /// The tri-state value after casting this vote on `current`.
    ///
    /// Voting the same direction again clears the vote; voting the other
    /// direction overwrites it.
    pub fn apply(self, current: Option<bool>) -> Option<bool> {
        match current {
            Some(existing) if existing == self.as_bool() => None,
            _ => Some(self.as_bool()),
        }
    }
}

impl std::str::FromStr for Vote {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "helpful" | "yes" | "+" => Ok(Self::Up),
            "down" | "unhelpful" | "no" | "-" => Ok(Self::Down),
            other => Err(format!("unknown vote direction: {other:?}")),
        }
    }
}
