//! Gateway error types

use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use meshgen_runtime::JobError;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by gateway handlers.
///
/// Every variant renders as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Job(#[from] JobError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Job(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a multipart read failure, keeping the body-limit case distinct.
    pub fn from_multipart(err: MultipartError, limit: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge(limit)
        } else {
            GatewayError::InvalidRequest(err.body_text())
        }
    }
}

impl From<MultipartRejection> for GatewayError {
    fn from(rejection: MultipartRejection) -> Self {
        GatewayError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: GatewayError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_job_errors_are_server_errors() {
        let (status, body) = render(JobError::ResourceUnavailable.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "model is not loaded");
    }

    #[tokio::test]
    async fn test_decode_error_message_is_descriptive() {
        let (status, body) = render(JobError::Decode("unsupported format".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "failed to decode image: unsupported format");
    }

    #[tokio::test]
    async fn test_client_errors() {
        let (status, _) = render(GatewayError::InvalidRequest("no file".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = render(GatewayError::PayloadTooLarge(1024)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "upload exceeds the 1024 byte limit");
    }
}
