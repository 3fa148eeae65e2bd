//! Live tracking: one poller per job, updates funnelled into a single board.

use std::sync::Arc;
use std::time::Instant;

use evalwatch_core::EvaluationService;
use evalwatch_tracker::{JobBoard, PollConfig, PollState, PollUpdate, start_polling};
use tokio::sync::mpsc;

use crate::display::{outcome_line, progress_line};

pub struct WatchStats {
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub elapsed_secs: f64,
}

impl WatchStats {
    fn from_board(board: &JobBoard, elapsed_secs: f64) -> Self {
        let count = |state: PollState| board.iter().filter(|j| j.state == state).count();
        Self {
            completed: count(PollState::Completed),
            failed: count(PollState::Failed),
            timed_out: count(PollState::TimedOut),
            cancelled: count(PollState::Cancelled),
            elapsed_secs,
        }
    }
}

/// Track `jobs` (evaluation id, document name) until every one of them
/// finishes or the user interrupts.
pub async fn watch_jobs(
    service: Arc<dyn EvaluationService>,
    jobs: Vec<(String, String)>,
    config: PollConfig,
) -> (JobBoard, WatchStats) {
    let start = Instant::now();
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, PollUpdate)>();

    let mut board = JobBoard::new();
    let mut handles = Vec::with_capacity(jobs.len());
    for (evaluation_id, document_name) in jobs {
        board.register(evaluation_id.clone(), document_name);
        let tx = tx.clone();
        let key = evaluation_id.clone();
        handles.push(start_polling(
            Arc::clone(&service),
            evaluation_id,
            config,
            move |update| {
                // The receiver is gone only once watching has stopped.
                let _ = tx.send((key.clone(), update));
            },
        ));
    }
    drop(tx);
    eprintln!(
        "  Watching {} evaluation(s), checking every {}s",
        board.len(),
        config.interval.as_secs()
    );

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    while board.active_count() > 0 {
        tokio::select! {
            message = rx.recv() => {
                let Some((evaluation_id, update)) = message else { break };
                if !board.apply(&evaluation_id, &update) {
                    continue;
                }
                let Some(job) = board.get(&evaluation_id) else { continue };
                if update.is_finished() {
                    eprintln!("\r\x1b[2K  {}", outcome_line(job));
                } else {
                    eprint!("\r\x1b[2K  {}", progress_line(job));
                }
            }
            _ = &mut interrupted => {
                eprintln!();
                for handle in handles.drain(..) {
                    let evaluation_id = handle.evaluation_id().to_string();
                    handle.stop().await;
                    if board.mark_cancelled(&evaluation_id)
                        && let Some(job) = board.get(&evaluation_id)
                    {
                        eprintln!("  {}", outcome_line(job));
                    }
                }
                break;
            }
        }
    }

    let stats = WatchStats::from_board(&board, start.elapsed().as_secs_f64());
    (board, stats)
}
