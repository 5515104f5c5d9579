//! Compliance and audio analysis handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use recut_models::{BoundingBox, ProfanityMatch, RegionAnalysis, VideoAnalysis};

use crate::error::ApiResult;
use crate::handlers::parse_job_id;
use crate::state::AppState;

/// POST /api/analyze-video/{id}
///
/// Full compliance analysis of the job's latest video.
pub async fn analyze_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoAnalysis>> {
    let job_id = parse_job_id(&id)?;
    let analysis = state.pipeline.analyze_video(&job_id).await?;
    Ok(Json(analysis))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeAudioRequest {
    #[serde(default)]
    pub custom_words: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeAudioResponse {
    pub matches: Vec<ProfanityMatch>,
}

/// POST /api/analyze-audio/{id}
///
/// Profanity detection with timestamps. Adjacent matches are merged into
/// phrases before being returned.
pub async fn analyze_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<AnalyzeAudioRequest>>,
) -> ApiResult<Json<AnalyzeAudioResponse>> {
    let job_id = parse_job_id(&id)?;
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let matches = state
        .pipeline
        .analyze_audio(&job_id, &request.custom_words)
        .await?;
    Ok(Json(AnalyzeAudioResponse { matches }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRegionRequest {
    pub timestamp: f64,
    #[serde(rename = "box")]
    pub box_: BoundingBox,
}

/// POST /api/analyze-region/{id}
///
/// Identify what sits inside a user-drawn box on one frame.
pub async fn analyze_region(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AnalyzeRegionRequest>,
) -> ApiResult<Json<RegionAnalysis>> {
    let job_id = parse_job_id(&id)?;
    let analysis = state
        .pipeline
        .analyze_region(&job_id, request.timestamp, &request.box_)
        .await?;
    Ok(Json(analysis))
}
