//! Visual edit handlers: blur/pixelate and generative replacement.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use recut_pipeline::{BlurParams, EffectKind, ReplaceParams};

use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_job_id;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    pub job_id: String,
    pub download_path: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlurObjectRequest {
    pub job_id: String,
    pub prompt: String,
    #[serde(default = "default_strength")]
    pub strength: u32,
    pub effect: EffectKind,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

fn default_strength() -> u32 {
    30
}

/// POST /api/blur-object
///
/// Blur or pixelate the prompted object; smart-clips when a time window is
/// given so only `[start, end]` is touched.
pub async fn blur_object(
    State(state): State<AppState>,
    Json(request): Json<BlurObjectRequest>,
) -> ApiResult<Json<EditResponse>> {
    let job_id = parse_job_id(&request.job_id)?;
    if request.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt must not be empty"));
    }

    let outcome = state
        .pipeline
        .blur_object(
            &job_id,
            BlurParams {
                prompt: request.prompt,
                strength: request.strength,
                effect: request.effect,
                start: request.start,
                end: request.end,
            },
        )
        .await?;

    Ok(Json(EditResponse {
        job_id: outcome.job_id.to_string(),
        download_path: outcome.download_path,
        message: outcome.message,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceGenerativeRequest {
    pub job_id: String,
    pub prompt: String,
    /// Requested edit length from t=0 when no explicit window is given.
    pub seconds: Option<f64>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    #[serde(rename = "referenceImageURL")]
    pub reference_image_url: Option<String>,
}

/// POST /api/replace-generative
///
/// Generative object replacement; clips beyond the safe chunk length are
/// sliced, edited per chunk, and stitched back.
pub async fn replace_generative(
    State(state): State<AppState>,
    Json(request): Json<ReplaceGenerativeRequest>,
) -> ApiResult<Json<EditResponse>> {
    let job_id = parse_job_id(&request.job_id)?;
    if request.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt must not be empty"));
    }

    // `seconds` without a window means "edit the first N seconds".
    let (start, end) = match (request.start, request.end, request.seconds) {
        (None, None, Some(seconds)) if seconds > 0.0 => (Some(0.0), Some(seconds)),
        (start, end, _) => (start, end),
    };

    let outcome = state
        .pipeline
        .replace_generative(
            &job_id,
            ReplaceParams {
                prompt: request.prompt,
                reference_image_url: request.reference_image_url,
                reference_image: None,
                start,
                end,
            },
        )
        .await?;

    Ok(Json(EditResponse {
        job_id: outcome.job_id.to_string(),
        download_path: outcome.download_path,
        message: outcome.message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blur_request_wire_format() {
        let json = r#"{
            "jobId": "abc12345",
            "prompt": "cigarette",
            "strength": 30,
            "effect": "blur",
            "start": 3.0,
            "end": 5.0
        }"#;
        let request: BlurObjectRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.job_id, "abc12345");
        assert_eq!(request.effect, EffectKind::Blur);
        assert_eq!(request.start, Some(3.0));
    }

    #[test]
    fn test_blur_request_defaults() {
        let json = r#"{"jobId": "abc12345", "prompt": "logo", "effect": "pixelate"}"#;
        let request: BlurObjectRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.strength, 30);
        assert!(request.start.is_none());
    }
}
