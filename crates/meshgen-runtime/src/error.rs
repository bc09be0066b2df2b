//! Runtime error types

use crate::hardware::DeviceKind;
use std::time::Duration;
use thiserror::Error;

/// Startup failures. The process keeps serving in an "unavailable" state.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("requested device {0} is not available on this system")]
    RequestedDeviceUnavailable(DeviceKind),

    #[error("model load failed: {0}")]
    LoadFailed(String),
}

/// Per-job failures, all surfaced to the caller as a failed conversion.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("model is not loaded")]
    ResourceUnavailable,

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("worker terminated before finishing the job: {0}")]
    WorkerLost(String),

    #[error("job did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Error raised by a model pipeline or export codec.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<image::ImageError> for CollaboratorError {
    fn from(err: image::ImageError) -> Self {
        Self(err.to_string())
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}
