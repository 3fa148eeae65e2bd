//! Terminal rendering for evaluations.
//!
//! Reports are printed as a vertical card grouped by outcome, worst first, so
//! the requirements that need attention are read before the ones that passed.

use std::io::{self, Write};

use chrono::{DateTime, Utc};

use evalwatch_core::{
    ComplianceReport, EvaluationJob, FeedbackUpsert, ProgressView, RequirementResult,
    RequirementStatus,
};
use evalwatch_tracker::{FeedbackReconciler, FeedbackRow, PollOutcome, TrackedJob};

const MAX_LIST_ITEMS: usize = 5;
const MAX_TEXT: usize = 100;

// ── Section groupings ──

const SECTIONS: &[(RequirementStatus, &str)] = &[
    (RequirementStatus::Fail, "Failed"),
    (RequirementStatus::Flagged, "Flagged for review"),
    (RequirementStatus::Error, "Not evaluated (engine error)"),
    (RequirementStatus::Pending, "Pending"),
    (RequirementStatus::Pass, "Passed"),
    (RequirementStatus::NotApplicable, "Not applicable"),
];

// ── Public API ──

/// Print a completed report as a card, with feedback markers when available.
pub fn print_report_card(
    report: &ComplianceReport,
    feedback: Option<&FeedbackReconciler>,
) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write_report_card(&mut out, report, feedback)
}

pub fn print_job_list(jobs: &[EvaluationJob]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write_job_list(&mut out, jobs)
}

pub fn print_feedback(feedback: &FeedbackReconciler) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if feedback.rows().next().is_none() {
        writeln!(out, "No feedback recorded for {}", feedback.evaluation_id())?;
        return Ok(());
    }
    writeln!(out, "=== Feedback for {} ===", feedback.evaluation_id())?;
    for (requirement_id, row) in feedback.rows() {
        writeln!(out, "  {:<12} {}", requirement_id, describe_feedback(row))?;
    }
    Ok(())
}

/// One-line status of a tracked job, for the live progress display.
pub fn progress_line(job: &TrackedJob) -> String {
    format!(
        "{} [{}] {}",
        truncate(&job.document_name, 32),
        job.status,
        job.progress.summary_line()
    )
}

/// Final line for a job whose polling ended.
pub fn outcome_line(job: &TrackedJob) -> String {
    let name = truncate(&job.document_name, 32);
    match &job.outcome {
        Some(PollOutcome::Completed { job: record, .. }) => match record.overall_compliance_score {
            Some(score) => format!("{name}: completed, compliance {score:.1}%"),
            None => format!("{name}: completed"),
        },
        Some(PollOutcome::Failed { error_message, .. }) => {
            format!("{name}: failed: {error_message}")
        }
        Some(PollOutcome::TimedOut { reason, progress, .. }) => format!(
            "{name}: could not confirm completion ({reason}); last seen {}. \
             The evaluation may still be running: evalwatch watch {}",
            progress_brief(progress),
            job.evaluation_id
        ),
        Some(PollOutcome::Cancelled) => format!("{name}: stopped watching"),
        None => progress_line(job),
    }
}

// ── Report card ──

pub fn write_report_card(
    out: &mut impl Write,
    report: &ComplianceReport,
    feedback: Option<&FeedbackReconciler>,
) -> io::Result<()> {
    let tally = report.tally();
    writeln!(out, "=== {} ===", report.document_name)?;
    writeln!(out, "  {:<26} {}", "evaluation", report.evaluation_id)?;
    writeln!(out, "  {:<26} {:.1}%", "overall score", report.overall_score)?;
    if !report.requirements.is_empty() {
        writeln!(
            out,
            "  {:<26} {:.1}% (engine errors excluded)",
            "computed score",
            tally.compliance_score()
        )?;
    }
    writeln!(
        out,
        "  {:<26} {} pass · {} fail · {} flagged · {} n/a",
        "requirements", tally.pass, tally.fail, tally.flagged, tally.not_applicable
    )?;
    if tally.error > 0 {
        writeln!(out, "  {:<26} {}", "not evaluated", tally.error)?;
    }
    writeln!(out)?;

    write_list(out, "High-risk findings", &report.high_risk_findings)?;
    write_list(out, "Key gaps", &report.key_gaps)?;

    let ordered = report.in_clause_order();
    for (status, header) in SECTIONS {
        let rows: Vec<&RequirementResult> = ordered
            .iter()
            .copied()
            .filter(|r| r.status == *status)
            .collect();
        if rows.is_empty() {
            continue;
        }
        writeln!(out, "{header} ({})", rows.len())?;
        for result in rows {
            let row = feedback.and_then(|f| f.row(&result.requirement_id));
            write_requirement(out, result, *status, row)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_requirement(
    out: &mut impl Write,
    result: &RequirementResult,
    status: RequirementStatus,
    feedback: Option<&FeedbackRow>,
) -> io::Result<()> {
    write!(out, "  {:<10} {}", result.requirement_id, truncate(&result.title, 60))?;
    if let Some(confidence) = result.confidence_label() {
        write!(out, "  [{confidence}]")?;
    }
    if let Some(row) = feedback {
        write!(out, "  {}", describe_feedback(row))?;
    }
    writeln!(out)?;

    // Passing and n/a rows stay on one line.
    if matches!(status, RequirementStatus::Pass | RequirementStatus::NotApplicable) {
        return Ok(());
    }
    if !result.evaluation_rationale.is_empty() {
        writeln!(out, "      {}", truncate(&result.evaluation_rationale, MAX_TEXT))?;
    }
    write_items(out, "gap", &result.gaps_identified)?;
    write_items(out, "fix", &result.recommendations)?;
    write_items(out, "evidence", &result.evidence_snippets)?;
    Ok(())
}

fn write_list(out: &mut impl Write, header: &str, items: &[String]) -> io::Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "{header}")?;
    for item in items.iter().take(MAX_LIST_ITEMS) {
        writeln!(out, "  - {}", truncate(item, MAX_TEXT))?;
    }
    if items.len() > MAX_LIST_ITEMS {
        writeln!(out, "  ... and {} more", items.len() - MAX_LIST_ITEMS)?;
    }
    writeln!(out)
}

fn write_items(out: &mut impl Write, label: &str, items: &[String]) -> io::Result<()> {
    for item in items.iter().take(MAX_LIST_ITEMS) {
        writeln!(out, "      {label}: {}", truncate(item, MAX_TEXT))?;
    }
    if items.len() > MAX_LIST_ITEMS {
        writeln!(out, "      ... and {} more", items.len() - MAX_LIST_ITEMS)?;
    }
    Ok(())
}

// ── Job list ──

pub fn write_job_list(out: &mut impl Write, jobs: &[EvaluationJob]) -> io::Result<()> {
    if jobs.is_empty() {
        return writeln!(out, "No evaluations yet");
    }
    writeln!(
        out,
        "{:<38} {:<12} {:<17} {:<17} {:>7}  document",
        "id", "status", "created", "completed", "score"
    )?;
    for job in jobs {
        let created = list_time(job.created_at_utc());
        let completed = list_time(job.completed_at_utc());
        let score = job
            .overall_compliance_score
            .map(|s| format!("{s:.1}%"))
            .unwrap_or_else(|| "-".into());
        writeln!(
            out,
            "{:<38} {:<12} {:<17} {:<17} {:>7}  {}",
            job.id,
            job.status,
            created,
            completed,
            score,
            truncate(&job.document_name, 40)
        )?;
    }
    Ok(())
}

// ── Helpers ──

fn list_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into())
}

fn describe_feedback(row: &FeedbackRow) -> String {
    let FeedbackUpsert {
        is_helpful,
        comment,
    } = row.value();
    let mut text = match is_helpful {
        Some(true) => "helpful".to_string(),
        Some(false) => "not helpful".to_string(),
        None => "no vote".to_string(),
    };
    if let Some(comment) = comment {
        text.push_str(&format!(" · \"{}\"", truncate(&comment, 60)));
    }
    if row.is_saving() {
        text.push_str(" (saving)");
    }
    if let Some(err) = row.error() {
        text.push_str(&format!(" (not saved: {})", err.source));
    }
    text
}

fn progress_brief(progress: &ProgressView) -> String {
    format!(
        "{}/{} requirements",
        progress.completed_requirements, progress.total_requirements
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
