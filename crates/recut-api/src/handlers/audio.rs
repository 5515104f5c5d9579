//! Audio censoring and replacement-suggestion handlers.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use recut_models::ProfanityMatch;
use recut_pipeline::{BeepParams, DubParams, VoiceChoice};

use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_job_id;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CensorMode {
    Beep,
    Dub,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CensorAudioRequest {
    pub job_id: String,
    pub mode: CensorMode,
    #[serde(default)]
    pub custom_words: Vec<String>,
    #[serde(default)]
    pub custom_replacements: HashMap<String, String>,
    /// Preset voice name ("male"/"female") or "clone".
    #[serde(default = "default_voice")]
    pub voice: String,
    pub voice_sample_start: Option<f64>,
    pub voice_sample_end: Option<f64>,
}

fn default_voice() -> String {
    "female".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CensorAudioResponse {
    pub job_id: String,
    pub matches: Vec<ProfanityMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
    pub message: String,
}

/// POST /api/censor-audio
///
/// Beep or dub every detected profanity window. A clean video is a no-op:
/// matches come back empty and the output is unchanged.
pub async fn censor_audio(
    State(state): State<AppState>,
    Json(request): Json<CensorAudioRequest>,
) -> ApiResult<Json<CensorAudioResponse>> {
    let job_id = parse_job_id(&request.job_id)?;

    let outcome = match request.mode {
        CensorMode::Beep => {
            state
                .pipeline
                .beep_audio(
                    &job_id,
                    BeepParams {
                        custom_words: request.custom_words,
                    },
                )
                .await?
        }
        CensorMode::Dub => {
            let voice = match request.voice.as_str() {
                "clone" => VoiceChoice::Clone,
                preset => VoiceChoice::Preset(preset.to_string()),
            };
            let voice_sample = match (request.voice_sample_start, request.voice_sample_end) {
                (Some(start), Some(end)) => Some((start, end)),
                (None, None) => None,
                _ => {
                    return Err(ApiError::bad_request(
                        "voiceSampleStart and voiceSampleEnd must be provided together",
                    ))
                }
            };

            state
                .pipeline
                .dub_audio(
                    &job_id,
                    DubParams {
                        custom_words: request.custom_words,
                        custom_replacements: request.custom_replacements,
                        voice,
                        voice_sample,
                    },
                )
                .await?
        }
    };

    Ok(Json(CensorAudioResponse {
        job_id: outcome.job_id.to_string(),
        matches: outcome.matches,
        download_path: outcome.download_path,
        message: outcome.message,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestReplacementsRequest {
    pub words_to_replace: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestReplacementsResponse {
    pub suggestions: Vec<SuggestionEntry>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionEntry {
    pub original: String,
    pub alternatives: Vec<String>,
    pub duration: f64,
}

/// POST /api/suggest-replacements/{id}
pub async fn suggest_replacements(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SuggestReplacementsRequest>,
) -> ApiResult<Json<SuggestReplacementsResponse>> {
    let job_id = parse_job_id(&id)?;
    if request.words_to_replace.is_empty() {
        return Err(ApiError::bad_request("wordsToReplace must not be empty"));
    }

    let suggestions = state
        .pipeline
        .suggest_replacements(&job_id, &request.words_to_replace)
        .await?;

    Ok(Json(SuggestReplacementsResponse {
        suggestions: suggestions
            .into_iter()
            .map(|s| SuggestionEntry {
                original: s.original,
                alternatives: s.alternatives,
                duration: s.duration,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_censor_request_wire_format() {
        let json = r#"{
            "jobId": "abc12345",
            "mode": "dub",
            "customReplacements": {"damn": "darn"},
            "voice": "clone",
            "voiceSampleStart": 5.0,
            "voiceSampleEnd": 17.0
        }"#;
        let request: CensorAudioRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.mode, CensorMode::Dub);
        assert_eq!(request.voice, "clone");
        assert_eq!(request.voice_sample_start, Some(5.0));
        assert_eq!(request.custom_replacements["damn"], "darn");
    }

    #[test]
    fn test_censor_request_defaults() {
        let json = r#"{"jobId": "abc12345", "mode": "beep"}"#;
        let request: CensorAudioRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.mode, CensorMode::Beep);
        assert_eq!(request.voice, "female");
        assert!(request.custom_words.is_empty());
    }
}
