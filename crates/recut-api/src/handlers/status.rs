//! Status, preview, download, and delete handlers.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use recut_models::Stage;

use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_job_id;
use crate::state::AppState;

/// Current status of a processing job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub job_id: String,
    pub stage: Stage,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/status/{id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let job_id = parse_job_id(&id)?;
    let status = state.pipeline.status(&job_id).await?;

    Ok(Json(StatusResponse {
        job_id: job_id.to_string(),
        stage: status.stage,
        progress: status.progress,
        error: status.error,
    }))
}

/// GET /api/preview/{id}/frame/{index}
pub async fn get_preview_frame(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Response> {
    let job_id = parse_job_id(&id)?;
    let path = state.pipeline.preview_frame(&job_id, index).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read frame: {}", e)))?;

    let content_type = if path.extension().and_then(|e| e.to_str()) == Some("jpg") {
        "image/jpeg"
    } else {
        "image/png"
    };

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// GET /api/download/{id}
///
/// Serves the latest edit when one exists, else the original source.
pub async fn download_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let job_id = parse_job_id(&id)?;
    let path = state.pipeline.download_path(&job_id).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read video: {}", e)))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// DELETE /api/{id}
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job_id = parse_job_id(&id)?;
    state.pipeline.delete_job(&job_id).await?;
    Ok(Json(serde_json::json!({ "deleted": job_id.to_string() })))
}
