//! Blocking work offload
//!
//! Decode, inference and export are CPU/GPU bound and must never run on the
//! async executor threads that accept connections. [`Offloader`] moves them
//! onto tokio's blocking pool, bounded by a semaphore so at most `workers`
//! jobs hold a blocking thread at once.
//!
//! Work is never cancelled. The semaphore permit travels into the blocking
//! closure, so a caller that stops waiting (dropped future, deadline) leaves
//! the job running to completion, cleanup included, and the slot stays
//! occupied until then.

use crate::error::JobError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Bounded pool for blocking jobs.
#[derive(Debug, Clone)]
pub struct Offloader {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl Offloader {
    /// Create a pool allowing `workers` concurrent blocking jobs (minimum 1).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of idle worker slots right now.
    pub fn idle(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `work` on a blocking worker and wait for its result.
    ///
    /// A panic inside `work` is reported as [`JobError::WorkerLost`].
    pub async fn submit<F, T>(&self, work: F) -> Result<T, JobError>
    where
        F: FnOnce() -> Result<T, JobError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| JobError::WorkerLost("worker pool closed".into()))?;

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        });

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                let reason = panic_message(err.into_panic());
                warn!(reason = %reason, "blocking job panicked");
                Err(JobError::WorkerLost(reason))
            }
            Err(err) => Err(JobError::WorkerLost(err.to_string())),
        }
    }

    /// Like [`submit`](Self::submit), but stop waiting after `deadline`.
    ///
    /// The deadline covers queueing and execution. When it fires the caller
    /// gets [`JobError::TimedOut`]; a job that already started keeps running.
    pub async fn submit_with_deadline<F, T>(
        &self,
        work: F,
        deadline: Option<Duration>,
    ) -> Result<T, JobError>
    where
        F: FnOnce() -> Result<T, JobError> + Send + 'static,
        T: Send + 'static,
    {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, self.submit(work))
                .await
                .unwrap_or(Err(JobError::TimedOut(limit))),
            None => self.submit(work).await,
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
