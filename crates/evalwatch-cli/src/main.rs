mod display;
mod watch;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use evalwatch_client::{ClientConfig, HttpEvaluationService};
use evalwatch_core::{EvaluationService, Vote};
use evalwatch_tracker::{FeedbackReconciler, JobBoard, PollConfig, PollOutcome, read_upload, submit};
use tracing_subscriber::EnvFilter;

use crate::watch::{WatchStats, watch_jobs};

/// Exit code when completion could not be confirmed within the polling budget.
const EXIT_UNCONFIRMED: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// evalwatch: submit documents for compliance evaluation and follow them to completion.
#[derive(Parser, Debug)]
#[command(name = "evalwatch", version, about)]
struct Cli {
    /// Base URL of the evaluation API.
    #[arg(long, global = true, env = "EVALWATCH_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, global = true, env = "EVALWATCH_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    http_timeout_secs: u64,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct PollArgs {
    /// Seconds between status checks.
    #[arg(long, env = "EVALWATCH_POLL_INTERVAL_SECS", default_value_t = 5)]
    poll_interval_secs: u64,

    /// Consecutive checks without progress before giving up.
    #[arg(long, env = "EVALWATCH_IDLE_CAP", default_value_t = 120)]
    idle_cap: u32,

    /// Total seconds to keep checking one evaluation.
    #[arg(long, env = "EVALWATCH_MAX_DURATION_SECS", default_value_t = 1800)]
    max_duration_secs: u64,
}

impl PollArgs {
    fn to_config(self) -> anyhow::Result<PollConfig> {
        PollConfig::from_secs(self.poll_interval_secs, self.idle_cap, self.max_duration_secs)
            .context("invalid polling settings")
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload documents and follow their evaluations.
    Submit {
        /// PDF or DOCX files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Framework to evaluate against.
        #[arg(long, short)]
        framework: String,
        /// Print the evaluation ids and exit without waiting.
        #[arg(long)]
        no_wait: bool,
        #[command(flatten)]
        poll: PollArgs,
    },
    /// Follow an existing evaluation until it finishes.
    Watch {
        evaluation_id: String,
        #[command(flatten)]
        poll: PollArgs,
    },
    /// List evaluations.
    List,
    /// Show the results of a completed evaluation.
    Report { evaluation_id: String },
    /// Review feedback on requirement results.
    #[command(subcommand)]
    Feedback(FeedbackCommand),
}

#[derive(Subcommand, Debug)]
enum FeedbackCommand {
    /// Show recorded feedback.
    List { evaluation_id: String },
    /// Vote a result up or down. Repeating the same vote clears it.
    Vote {
        evaluation_id: String,
        requirement_id: String,
        /// up or down
        direction: Vote,
    },
    /// Set the comment on a result. An empty comment clears it.
    Comment {
        evaluation_id: String,
        requirement_id: String,
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let service = connect(&cli)?;
    tracing::debug!(api_url = %cli.api_url, "evalwatch v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Submit {
            files,
            framework,
            no_wait,
            poll,
        } => cmd_submit(service, files, &framework, no_wait, poll).await,
        Commands::Watch {
            evaluation_id,
            poll,
        } => cmd_watch(service, evaluation_id, poll).await,
        Commands::List => {
            let jobs = service
                .list_evaluations()
                .await
                .context("listing evaluations")?;
            display::print_job_list(&jobs)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Report { evaluation_id } => {
            let report = service
                .get_compliance_report(&evaluation_id)
                .await
                .with_context(|| format!("fetching results for {evaluation_id}"))?;
            let mut feedback = FeedbackReconciler::load(Arc::clone(&service), &evaluation_id).await;
            if let Some(warning) = feedback.take_warning() {
                eprintln!("warning: {warning}");
            }
            display::print_report_card(&report, Some(&feedback))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Feedback(command) => cmd_feedback(service, command).await,
    }
}

fn connect(cli: &Cli) -> anyhow::Result<Arc<dyn EvaluationService>> {
    let config = ClientConfig {
        base_url: cli.api_url.clone(),
        timeout: Duration::from_secs(cli.http_timeout_secs),
    };
    let service = HttpEvaluationService::new(config)
        .with_context(|| format!("configuring client for {}", cli.api_url))?;
    Ok(Arc::new(service))
}

async fn cmd_submit(
    service: Arc<dyn EvaluationService>,
    files: Vec<PathBuf>,
    framework: &str,
    no_wait: bool,
    poll: PollArgs,
) -> anyhow::Result<ExitCode> {
    let config = poll.to_config()?;

    let mut submitted = Vec::with_capacity(files.len());
    let mut rejected = 0usize;
    for path in &files {
        let upload = match read_upload(path).await {
            Ok(upload) => upload,
            Err(err) => {
                eprintln!("  {}: {err}", path.display());
                rejected += 1;
                continue;
            }
        };
        match submit(Arc::clone(&service), &upload, framework).await {
            Ok(job) => {
                println!("{}  {}", job.evaluation_id(), upload.file_name);
                submitted.push((job.evaluation_id().to_string(), upload.file_name));
            }
            Err(err) => {
                eprintln!("  {}: {err}", upload.file_name);
                rejected += 1;
            }
        }
    }

    if submitted.is_empty() {
        anyhow::bail!("no documents were submitted");
    }
    if no_wait {
        return Ok(exit_for_rejections(rejected));
    }

    let (board, stats) = watch_jobs(Arc::clone(&service), submitted, config).await;
    print_reports(service.as_ref(), &board).await;
    print_summary(&stats);
    let code = exit_code(&stats);
    if code == ExitCode::SUCCESS {
        return Ok(exit_for_rejections(rejected));
    }
    Ok(code)
}

async fn cmd_watch(
    service: Arc<dyn EvaluationService>,
    evaluation_id: String,
    poll: PollArgs,
) -> anyhow::Result<ExitCode> {
    let config = poll.to_config()?;
    // Only used for labelling; the poller does its own querying.
    let document_name = match service.get_job_status(&evaluation_id).await {
        Ok(job) if !job.document_name.is_empty() => job.document_name,
        Ok(_) => evaluation_id.clone(),
        Err(err) if err.is_rejection() => {
            return Err(err).with_context(|| format!("looking up {evaluation_id}"));
        }
        Err(err) => {
            tracing::warn!(%evaluation_id, error = %err, "initial lookup failed, polling anyway");
            evaluation_id.clone()
        }
    };

    let (board, stats) = watch_jobs(Arc::clone(&service), vec![(evaluation_id, document_name)], config).await;
    print_reports(service.as_ref(), &board).await;
    Ok(exit_code(&stats))
}

async fn cmd_feedback(
    service: Arc<dyn EvaluationService>,
    command: FeedbackCommand,
) -> anyhow::Result<ExitCode> {
    match command {
        FeedbackCommand::List { evaluation_id } => {
            let mut feedback = FeedbackReconciler::load(service, evaluation_id).await;
            if let Some(warning) = feedback.take_warning() {
                eprintln!("warning: {warning}");
            }
            display::print_feedback(&feedback)?;
        }
        FeedbackCommand::Vote {
            evaluation_id,
            requirement_id,
            direction,
        } => {
            // The vote toggles against what is stored, and the upsert carries
            // the stored comment, so an unreadable list stops here.
            let mut feedback = FeedbackReconciler::try_load(service, evaluation_id)
                .await
                .context("loading stored feedback")?;
            feedback
                .vote_and_sync(&requirement_id, direction)
                .await
                .context("saving vote")?;
            display::print_feedback(&feedback)?;
        }
        FeedbackCommand::Comment {
            evaluation_id,
            requirement_id,
            text,
        } => {
            let mut feedback = FeedbackReconciler::try_load(service, evaluation_id)
                .await
                .context("loading stored feedback")?;
            feedback
                .comment_and_sync(&requirement_id, &text)
                .await
                .context("saving comment")?;
            display::print_feedback(&feedback)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Fetch and print results for every job that completed.
async fn print_reports(service: &dyn EvaluationService, board: &JobBoard) {
    for job in board.iter() {
        let Some(outcome @ PollOutcome::Completed { .. }) = &job.outcome else {
            continue;
        };
        match evalwatch_tracker::fetch_report(service, &job.evaluation_id, outcome).await {
            Ok(report) => {
                println!();
                if let Err(err) = display::print_report_card(&report, None) {
                    tracing::warn!(error = %err, "could not print report");
                }
            }
            Err(err) => eprintln!("  {}: {err}", job.document_name),
        }
    }
}

fn print_summary(stats: &WatchStats) {
    eprintln!(
        "  {} completed, {} failed, {} unconfirmed, {} stopped in {:.1}s",
        stats.completed, stats.failed, stats.timed_out, stats.cancelled, stats.elapsed_secs
    );
}

fn exit_code(stats: &WatchStats) -> ExitCode {
    if stats.failed > 0 {
        ExitCode::FAILURE
    } else if stats.timed_out > 0 {
        ExitCode::from(EXIT_UNCONFIRMED)
    } else if stats.cancelled > 0 {
        ExitCode::from(EXIT_INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    }
}

fn exit_for_rejections(rejected: usize) -> ExitCode {
    if rejected > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_feedback_vote() {
        let cli = Cli::try_parse_from(["evalwatch", "feedback", "vote", "eval-1", "4.2", "up"]).unwrap();
        match cli.command {
            Commands::Feedback(FeedbackCommand::Vote { direction, .. }) => {
                assert_eq!(direction, Vote::Up)
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn submit_requires_a_framework() {
        assert!(Cli::try_parse_from(["evalwatch", "submit", "plan.pdf"]).is_err());
        let cli = Cli::try_parse_from([
            "evalwatch",
            "submit",
            "a.pdf",
            "b.docx",
            "--framework",
            "iso-14971",
            "--poll-interval-secs",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit { files, poll, .. } => {
                assert_eq!(files.len(), 2);
                assert_eq!(poll.to_config().unwrap().interval, Duration::from_secs(2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn timeouts_exit_distinctly() {
        let stats = |failed, timed_out| WatchStats {
            completed: 1,
            failed,
            timed_out,
            cancelled: 0,
            elapsed_secs: 0.0,
        };
        assert_eq!(exit_code(&stats(0, 0)), ExitCode::SUCCESS);
        assert_eq!(exit_code(&stats(0, 1)), ExitCode::from(EXIT_UNCONFIRMED));
        assert_eq!(exit_code(&stats(1, 1)), ExitCode::FAILURE);
    }
}
