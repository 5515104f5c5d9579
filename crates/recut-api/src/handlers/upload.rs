//! Upload handler.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use recut_models::VideoInfo;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response after uploading a video.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: String,
    pub message: String,
    #[serde(rename = "previewURL")]
    pub preview_url: String,
    pub video_info: VideoInfo,
}

/// POST /api/upload
///
/// Multipart upload of a source video. Returns as soon as the job exists
/// with a probed preview; full frame extraction continues in the background
/// (poll `/api/status/{id}`).
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut payload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(String::from) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        payload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) =
        payload.ok_or_else(|| ApiError::bad_request("No video file in request"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    let extension = filename
        .rsplit('.')
        .next()
        .filter(|ext| *ext != filename)
        .ok_or_else(|| ApiError::bad_request("Filename has no extension"))?;

    info!("Upload received: {} ({} bytes)", filename, bytes.len());
    let outcome = state.pipeline.upload(bytes, extension).await?;

    Ok(Json(UploadResponse {
        preview_url: format!("/api/preview/{}/frame/0", outcome.job_id),
        message: "Upload accepted; frame extraction running".to_string(),
        job_id: outcome.job_id.to_string(),
        video_info: outcome.video_info,
    }))
}
