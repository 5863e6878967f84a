//! Bounded worker pool.
//!
//! Every job is spawned onto the tokio runtime straight away and waits for
//! a semaphore permit before doing any work, so at most `size` jobs run at
//! once. Completions are handed back through a [`Batch`] in the order they
//! settle. Dropping a batch aborts whatever is still outstanding.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::debug;

/// Why a job produced no output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("job cancelled before completion")]
    Cancelled,
}

/// A fixed-size pool of concurrently running jobs.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    /// Create a pool running at most `size` jobs at a time (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    /// Pool sized to `requested`, or one slot per unit when unset.
    pub fn for_units(units: usize, requested: Option<usize>) -> Self {
        Self::new(requested.unwrap_or(units))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn every job; results come back tagged with the job's position.
    pub fn spawn_all<I, F, T>(&self, jobs: I) -> Batch<T>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let pending = FuturesUnordered::new();
        let mut aborts = Vec::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let permits = self.permits.clone();
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                Some(job.await)
            });
            aborts.push(handle.abort_handle());

            pending.push(
                async move {
                    let outcome = match handle.await {
                        Ok(Some(output)) => Ok(output),
                        Ok(None) => Err(JobError::Cancelled),
                        Err(e) if e.is_panic() => Err(JobError::Panicked(e.to_string())),
                        Err(_) => Err(JobError::Cancelled),
                    };
                    (index, outcome)
                }
                .boxed(),
            );
        }

        debug!("Spawned {} jobs on a pool of {}", aborts.len(), self.size);
        Batch { pending, aborts }
    }
}

/// Jobs submitted together; yields each one as it settles.
pub struct Batch<T> {
    pending: FuturesUnordered<BoxFuture<'static, (usize, Result<T, JobError>)>>,
    aborts: Vec<AbortHandle>,
}

impl<T> Batch<T> {
    /// Next settled job, or `None` once every job has settled.
    pub async fn next(&mut self) -> Option<(usize, Result<T, JobError>)> {
        self.pending.next().await
    }

    /// Number of jobs in the batch.
    pub fn len(&self) -> usize {
        self.aborts.len()
    }
}

impl<T> Drop for Batch<T> {
    fn drop(&mut self) {
        for handle in &self.aborts {
            handle.abort();
        }
    }
}
