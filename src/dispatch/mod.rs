//! Concurrent dispatch of work units to the worker function.
//!
//! Every unit is sent exactly once on the injected [`WorkerPool`]. A unit
//! that fails is recorded and never retried, and never stops its siblings.
//! [`Dispatcher::dispatch`] returns only when every unit has settled.

pub mod pool;

pub use pool::WorkerPool;

use crate::backend::protocol::WorkerRequest;
use crate::backend::RouterClient;
use crate::models::{Outcome, Session, TaskResult, UnitKind, WorkUnit};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sends work units to the worker function under a session.
pub struct Dispatcher {
    client: RouterClient,
    pool: WorkerPool,
    show_progress: bool,
}

impl Dispatcher {
    pub fn new(client: RouterClient, pool: WorkerPool) -> Self {
        Self {
            client,
            pool,
            show_progress: false,
        }
    }

    /// Draw a progress bar while units are in flight.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Send every unit and wait for all of them to settle.
    ///
    /// Results come back in submission order, one per unit.
    pub async fn dispatch(&self, units: Vec<WorkUnit>, session: &Session) -> Vec<TaskResult> {
        let total = units.len();
        info!(
            "Dispatching {} units under session {} (pool size {})",
            total,
            session.id,
            self.pool.size()
        );

        // Kept so aborted jobs can still be attributed.
        let identities: Vec<(usize, String)> =
            units.iter().map(|u| (u.id, u.worker_id())).collect();

        let progress = self.progress_bar(total);
        let jobs = units.into_iter().map(|unit| {
            let client = self.client.clone();
            let session_id = session.id.clone();
            async move { run_unit(&client, unit, &session_id).await }
        });

        let mut batch = self.pool.spawn_all(jobs);
        debug!("{} units queued", batch.len());
        let mut slots: Vec<Option<TaskResult>> = vec![None; total];

        while let Some((index, settled)) = batch.next().await {
            let result = match settled {
                Ok(result) => result,
                Err(e) => {
                    let (unit_id, worker_id) = identities[index].clone();
                    TaskResult::aborted(unit_id, worker_id, e.to_string())
                }
            };

            log_settled(&result, index, total);
            progress.inc(1);
            slots[index] = Some(result);
        }

        progress.finish_and_clear();

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let (unit_id, worker_id) = identities[index].clone();
                    TaskResult::aborted(unit_id, worker_id, "unit never settled")
                })
            })
            .collect()
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// One blocking round trip to the worker for `unit`.
async fn run_unit(client: &RouterClient, unit: WorkUnit, session_id: &str) -> TaskResult {
    let worker_id = unit.worker_id();
    debug!("Sending {} to {}: '{}'", worker_id, client.worker_url(), unit.preview(50));

    let (agent_id, word_id) = match unit.kind {
        UnitKind::Chunk => (Some(worker_id.clone()), None),
        UnitKind::Word => (None, Some(worker_id.clone())),
    };
    let request = WorkerRequest {
        agent_id,
        word_id,
        text: unit.payload,
        session_id: session_id.to_string(),
        state_manager_url: client.config().worker_state_manager_url.clone(),
    };

    let start = Instant::now();
    let response = client.call_worker(&request).await;
    let elapsed = start.elapsed();

    let outcome = match response {
        Ok(reply) => Outcome::Success {
            reported_word_count: reply.word_count,
            reported_unique_words: reply.unique_words,
            state_updated: reply.state_updated,
            node_id: reply.node_id.unwrap_or_else(|| "unknown".to_string()),
            worker_error: reply.error.or(reply.message).filter(|_| !reply.state_updated),
        },
        Err(e) => Outcome::Failure {
            error_kind: e.kind(),
            message: e.to_string(),
        },
    };

    TaskResult {
        unit_id: unit.id,
        worker_id,
        elapsed_seconds: secs(elapsed),
        outcome,
    }
}

fn log_settled(result: &TaskResult, index: usize, total: usize) {
    match &result.outcome {
        Outcome::Success {
            state_updated,
            node_id,
            worker_error,
            reported_word_count,
            ..
        } => {
            info!(
                "✓ Unit {}/{} completed in {:.2}s ({} on {}, {} words, state updated: {})",
                index + 1,
                total,
                result.elapsed_seconds,
                result.worker_id,
                node_id,
                reported_word_count,
                state_updated
            );
            if !state_updated {
                warn!(
                    "{} did not update the state manager: {}",
                    result.worker_id,
                    worker_error.as_deref().unwrap_or("no reason given")
                );
            }
        }
        Outcome::Failure {
            error_kind,
            message,
        } => {
            warn!(
                "✗ Unit {}/{} failed ({}) after {:.2}s: {}",
                index + 1,
                total,
                error_kind,
                result.elapsed_seconds,
                message
            );
        }
    }
}

fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}
