//! Pipeline configuration.
//!
//! A single immutable value constructed at startup and passed into the
//! orchestrator; nothing here mutates after boot.

use std::path::PathBuf;
use std::time::Duration;

use recut_clients::VoicePresets;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory for job directories.
    pub storage_dir: PathBuf,
    /// Maximum accepted upload duration.
    pub max_video_seconds: f64,
    /// Safe chunk length for the generative backend. Operationally 5 s even
    /// though some backends advertise 10 s.
    pub chunk_seconds: f64,
    /// Smart-clip buffer around a requested time window.
    pub clip_buffer_seconds: f64,
    /// Gap below which adjacent profanity matches merge into one phrase.
    pub merge_gap_seconds: f64,
    /// Gap below which same-speaker matches cluster into one dub phrase.
    pub phrase_gap_seconds: f64,
    /// Mute padding around beeped matches.
    pub mute_padding_seconds: f64,
    /// Mute padding around dubbed phrases.
    pub dub_mute_padding_seconds: f64,
    /// Gain applied to dub overlays so they sit above the bed.
    pub dub_gain: f64,
    pub beep_frequency: u32,
    pub beep_volume: f64,
    /// Minimum voice-clone sample length; shorter samples warn.
    pub min_clone_sample_seconds: f64,
    /// How long cached profanity analysis stays valid.
    pub profanity_cache_secs: u64,
    /// TTL for signed URLs handed to backends.
    pub url_ttl: Duration,

    // External service credentials; which vendor sits behind each base URL
    // is decided by the client defaults and these env overrides.
    pub segmentation_api_token: String,
    pub segmentation_model_version: String,
    pub generative_api_key: String,
    pub tts_api_key: String,
    pub analyzer_api_key: String,
    pub voice_presets: VoicePresets,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("storage/jobs"),
            max_video_seconds: 300.0,
            chunk_seconds: 5.0,
            clip_buffer_seconds: 1.0,
            merge_gap_seconds: 0.5,
            phrase_gap_seconds: 1.0,
            mute_padding_seconds: 0.05,
            dub_mute_padding_seconds: 0.1,
            dub_gain: 1.5,
            beep_frequency: 1000,
            beep_volume: 0.9,
            min_clone_sample_seconds: 10.0,
            profanity_cache_secs: 600,
            url_ttl: Duration::from_secs(900),
            segmentation_api_token: String::new(),
            segmentation_model_version: String::new(),
            generative_api_key: String::new(),
            tts_api_key: String::new(),
            analyzer_api_key: String::new(),
            voice_presets: VoicePresets::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut presets = VoicePresets::default();
        if let Ok(v) = std::env::var("TTS_VOICE_MALE") {
            if !v.is_empty() {
                presets.male = v;
            }
        }
        if let Ok(v) = std::env::var("TTS_VOICE_FEMALE") {
            if !v.is_empty() {
                presets.female = v;
            }
        }

        Self {
            storage_dir: std::env::var("RECUT_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            max_video_seconds: env_f64("RECUT_MAX_VIDEO_SECONDS", defaults.max_video_seconds),
            chunk_seconds: env_f64("RECUT_CHUNK_SECONDS", defaults.chunk_seconds),
            clip_buffer_seconds: env_f64("RECUT_CLIP_BUFFER_SECONDS", defaults.clip_buffer_seconds),
            merge_gap_seconds: env_f64("RECUT_MERGE_GAP_SECONDS", defaults.merge_gap_seconds),
            phrase_gap_seconds: env_f64("RECUT_PHRASE_GAP_SECONDS", defaults.phrase_gap_seconds),
            profanity_cache_secs: std::env::var("RECUT_PROFANITY_CACHE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.profanity_cache_secs),
            segmentation_api_token: std::env::var("SEGMENTATION_API_TOKEN").unwrap_or_default(),
            segmentation_model_version: std::env::var("SEGMENTATION_MODEL_VERSION")
                .unwrap_or_default(),
            generative_api_key: std::env::var("GENERATIVE_API_KEY").unwrap_or_default(),
            tts_api_key: std::env::var("TTS_API_KEY").unwrap_or_default(),
            analyzer_api_key: std::env::var("ANALYZER_API_KEY").unwrap_or_default(),
            voice_presets: presets,
            ..defaults
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.chunk_seconds, 5.0);
        assert_eq!(config.clip_buffer_seconds, 1.0);
        assert_eq!(config.merge_gap_seconds, 0.5);
        assert_eq!(config.phrase_gap_seconds, 1.0);
        assert_eq!(config.dub_gain, 1.5);
    }
}
