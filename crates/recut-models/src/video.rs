//! Probed video metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Video file information as reported by ffprobe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Exact frame rate as a rational string (e.g., "30000/1001")
    pub fps_rational: String,
    /// Duration in seconds
    pub duration: f64,
    /// Video codec
    pub codec: String,
    /// Whether an audio stream is present
    pub has_audio: bool,
    /// Total frame count (duration * fps)
    pub total_frames: u64,
}

impl VideoInfo {
    /// Whether two frame rates are close enough to skip re-encoding.
    pub fn fps_matches(&self, other_fps: f64) -> bool {
        (self.fps - other_fps).abs() < 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(fps: f64) -> VideoInfo {
        VideoInfo {
            width: 1280,
            height: 720,
            fps,
            fps_rational: format!("{}/1", fps as u32),
            duration: 12.0,
            codec: "h264".to_string(),
            has_audio: true,
            total_frames: (12.0 * fps) as u64,
        }
    }

    #[test]
    fn test_fps_matches_within_tolerance() {
        assert!(info(30.0).fps_matches(29.97));
        assert!(info(30.0).fps_matches(30.0));
        assert!(!info(30.0).fps_matches(25.0));
        assert!(!info(24.0).fps_matches(25.0));
    }

    #[test]
    fn test_serde_camel_case() {
        let json = serde_json::to_value(info(30.0)).unwrap();
        assert!(json.get("hasAudio").is_some());
        assert!(json.get("fpsRational").is_some());
        assert!(json.get("totalFrames").is_some());
    }
}
