//! Image to 3D conversion endpoint
//!
//! POST /convert - multipart upload with one image file; responds with a GLB

use axum::{
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::MultipartRejection,
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use meshgen_runtime::{ArtifactName, ImageInput, JobError, OutputArtifact};
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

/// Multipart field name clients are expected to use for the image.
pub const UPLOAD_FIELD: &str = "file";

/// A file pulled out of the multipart body
#[derive(Debug)]
struct Upload {
    file_name: Option<String>,
    bytes: Bytes,
}

/// POST /convert
///
/// Reads the whole upload, decodes it and runs one conversion job, both on
/// the blocking pool. Job failures become `500 {"error": ...}`; a complete
/// artifact is the only thing ever returned with `200`.
pub async fn convert(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> GatewayResult<Response> {
    let request_id = Uuid::new_v4();
    let upload = read_upload(multipart?, state.max_upload_bytes).await?;
    let name = ArtifactName::from_upload(upload.file_name.as_deref());

    info!(
        request_id = %request_id,
        client_name = ?upload.file_name,
        base_name = %name.base(),
        bytes = upload.bytes.len(),
        "conversion requested"
    );

    let started = Instant::now();
    match run_conversion(&state, upload.bytes, name).await {
        Ok(artifact) => {
            info!(
                request_id = %request_id,
                file = %artifact.file_name(),
                artifact_bytes = artifact.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "conversion finished"
            );
            Ok(artifact_response(artifact))
        }
        Err(err) => {
            error!(
                request_id = %request_id,
                error = %err,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "conversion failed"
            );
            Err(err.into())
        }
    }
}

async fn read_upload(mut multipart: Multipart, limit: usize) -> GatewayResult<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::from_multipart(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) && field.file_name().is_none() {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| GatewayError::from_multipart(e, limit))?;
        return Ok(Upload { file_name, bytes });
    }

    Err(GatewayError::InvalidRequest(format!(
        "multipart body has no '{UPLOAD_FIELD}' file field"
    )))
}

/// Decode then convert, each step on the blocking pool.
async fn run_conversion(
    state: &AppState,
    bytes: Bytes,
    name: ArtifactName,
) -> Result<OutputArtifact, JobError> {
    let image = state
        .offloader
        .submit_with_deadline(move || ImageInput::decode(&bytes), state.job_deadline)
        .await?;

    let runner = state.runner.clone();
    state
        .offloader
        .submit_with_deadline(move || runner.run_job(image, name), state.job_deadline)
        .await
}

fn artifact_response(artifact: OutputArtifact) -> Response {
    let disposition = content_disposition(&artifact.file_name());
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, artifact.len().to_string()),
        ],
        artifact.bytes,
    )
        .into_response()
}

/// `attachment; filename="<name>"`, with an RFC 5987 `filename*` added when
/// the name is not plain ASCII.
pub fn content_disposition(file_name: &str) -> String {
    let printable = |c: char| c.is_ascii() && !c.is_ascii_control();
    if file_name.chars().all(printable) {
        return format!("attachment; filename=\"{file_name}\"");
    }
    let fallback: String = file_name
        .chars()
        .map(|c| if printable(c) { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}

/// Build the conversion router sub-tree
pub fn convert_router() -> axum::Router<AppState> {
    use axum::routing::post;
    axum::Router::new().route("/convert", post(convert))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_disposition() {
        assert_eq!(
            content_disposition("chair.glb"),
            "attachment; filename=\"chair.glb\""
        );
    }

    #[test]
    fn test_non_ascii_disposition_has_fallback() {
        let value = content_disposition("café.glb");
        assert!(value.starts_with("attachment; filename=\"caf_.glb\""));
        assert!(value.ends_with("filename*=UTF-8''caf%C3%A9.glb"));
        assert!(value.is_ascii());
    }
}
