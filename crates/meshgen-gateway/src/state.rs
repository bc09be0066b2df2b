//! Shared application state for the gateway

use meshgen_runtime::{ComputeHandle, JobRunner, Offloader};
use std::sync::Arc;
use std::time::Duration;

/// State shared across all request handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Runs conversions against the shared compute handle
    pub runner: JobRunner,
    /// Bounded pool that keeps decode/inference off the async workers
    pub offloader: Offloader,
    /// Caller-side deadline per offloaded step; `None` waits forever
    pub job_deadline: Option<Duration>,
    /// Request body cap, reported back when an upload exceeds it
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        runner: JobRunner,
        offloader: Offloader,
        job_deadline: Option<Duration>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            runner,
            offloader,
            job_deadline,
            max_upload_bytes,
        }
    }

    pub fn handle(&self) -> &Arc<ComputeHandle> {
        self.runner.handle()
    }
}
