//! Per-requirement evaluation results and the compliance report that carries them.

use serde::{Deserialize, Deserializer, Serialize};

use crate::clause_key::normalize_clause;

/// Outcome of evaluating a single requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementStatus {
    Pass,
    Fail,
    /// Needs human review. `PARTIAL` is the older label for the same outcome.
    #[serde(alias = "PARTIAL")]
    Flagged,
    #[serde(alias = "N/A", alias = "NA")]
    NotApplicable,
    /// Not yet evaluated.
    #[serde(rename = "pending", alias = "PENDING")]
    Pending,
    /// The engine could not produce a verdict.
    Error,
}

impl RequirementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Flagged => "FLAGGED",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::Pending => "pending",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Optional cost metrics recorded by the engine for one requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementMetrics {
    #[serde(
        default,
        alias = "duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_seconds: Option<f64>,
    #[serde(
        default,
        alias = "token_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub tokens_used: Option<u64>,
}

/// Evaluation result for one requirement of the framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ResultRow")]
pub struct RequirementResult {
    pub requirement_id: String,
    pub title: String,
    pub status: RequirementStatus,
    #[serde(rename = "confidence")]
    pub confidence_level: Option<ConfidenceLevel>,
    pub confidence_score: Option<f64>,
    pub evidence_snippets: Vec<String>,
    pub gaps_identified: Vec<String>,
    pub recommendations: Vec<String>,
    pub evaluation_rationale: String,
    #[serde(flatten)]
    pub metrics: RequirementMetrics,
}

/// Result row as written by the evaluators.
///
/// The text evaluator writes `confidence` as a level, the vision evaluator as
/// a score in `0..=1`.
#[derive(Deserialize)]
struct ResultRow {
    requirement_id: String,
    #[serde(default, deserialize_with = "nullable")]
    title: String,
    status: RequirementStatus,
    #[serde(default, alias = "confidence_level")]
    confidence: Option<Confidence>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default, alias = "evidence", deserialize_with = "nullable")]
    evidence_snippets: Vec<String>,
    #[serde(default, alias = "gaps", deserialize_with = "nullable")]
    gaps_identified: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    recommendations: Vec<String>,
    #[serde(default, alias = "rationale", deserialize_with = "nullable")]
    evaluation_rationale: String,
    #[serde(flatten)]
    metrics: RequirementMetrics,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Confidence {
    Level(ConfidenceLevel),
    Score(f64),
}

impl From<ResultRow> for RequirementResult {
    fn from(row: ResultRow) -> Self {
        let (confidence_level, confidence_score) = match row.confidence {
            Some(Confidence::Level(level)) => (Some(level), row.confidence_score),
            Some(Confidence::Score(score)) => (None, row.confidence_score.or(Some(score))),
            None => (None, row.confidence_score),
        };
        Self {
            requirement_id: row.requirement_id,
            title: row.title,
            status: row.status,
            confidence_level,
            confidence_score,
            evidence_snippets: row.evidence_snippets,
            gaps_identified: row.gaps_identified,
            recommendations: row.recommendations,
            evaluation_rationale: row.evaluation_rationale,
            metrics: row.metrics,
        }
    }
}

impl RequirementResult {
    /// Confidence for display: the level when known, otherwise the score.
    pub fn confidence_label(&self) -> Option<String> {
        match (self.confidence_level, self.confidence_score) {
            (Some(level), Some(score)) => Some(format!("{} ({score:.2})", level.as_str())),
            (Some(level), None) => Some(level.as_str().to_string()),
            (None, Some(score)) => Some(format!("{score:.2}")),
            (None, None) => None,
        }
    }
}

/// Treat an explicit JSON `null` the same as a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Count of requirement results per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTally {
    pub pass: u32,
    pub fail: u32,
    pub flagged: u32,
    pub not_applicable: u32,
    pub pending: u32,
    pub error: u32,
}

impl StatusTally {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a RequirementResult>) -> Self {
        let mut tally = Self::default();
        for result in results {
            match result.status {
                RequirementStatus::Pass => tally.pass += 1,
                RequirementStatus::Fail => tally.fail += 1,
                RequirementStatus::Flagged => tally.flagged += 1,
                RequirementStatus::NotApplicable => tally.not_applicable += 1,
                RequirementStatus::Pending => tally.pending += 1,
                RequirementStatus::Error => tally.error += 1,
            }
        }
        tally
    }

    pub fn total(&self) -> u32 {
        self.pass + self.fail + self.flagged + self.not_applicable + self.pending + self.error
    }

    /// Percentage of scored requirements that passed, rounded to one decimal.
    ///
    /// Requirements in `ERROR` are not scored.
    pub fn compliance_score(&self) -> f64 {
        let scored = self.total() - self.error;
        if scored == 0 {
            return 0.0;
        }
        let raw = f64::from(self.pass) / f64::from(scored) * 100.0;
        (raw * 10.0).round() / 10.0
    }
}

/// The full result set of a completed evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    #[serde(default)]
    pub evaluation_id: String,
    #[serde(default)]
    pub document_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub overall_score: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub summary_stats: serde_json::Map<String, serde_json::Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub requirements: Vec<RequirementResult>,
    #[serde(default, deserialize_with = "nullable")]
    pub high_risk_findings: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub key_gaps: Vec<String>,
}

impl ComplianceReport {
    pub fn tally(&self) -> StatusTally {
        StatusTally::from_results(&self.requirements)
    }

    /// Requirements in clause order (`4.1` < `4.1.2` < `4.2` < `10.1`).
    pub fn in_clause_order(&self) -> Vec<&RequirementResult> {
        let mut ordered: Vec<&RequirementResult> = self.requirements.iter().collect();
        ordered.sort_by_cached_key(|r| normalize_clause(&r.requirement_id));
        ordered
    }

    pub fn requirement(&self, requirement_id: &str) -> Option<&RequirementResult> {
        self.requirements
            .iter()
            .find(|r| r.requirement_id == requirement_id)
    }
}
