//! Frame extraction and video reconstruction.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use recut_models::BoundingBox;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Extract all frames as `frame_%06d.png`, strictly ascending by index.
///
/// Returns the sorted frame paths. `fps` overrides the source frame rate.
pub async fn extract_frames(
    video: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    fps: Option<f64>,
) -> MediaResult<Vec<PathBuf>> {
    let video = video.as_ref();
    let output_dir = output_dir.as_ref();
    tokio::fs::create_dir_all(output_dir).await?;

    let info = probe_video(video).await?;
    let target_fps = fps.unwrap_or(info.fps);

    let cmd = FfmpegCommand::new(video, output_dir.join("frame_%06d.png"))
        .video_filter(format!("fps={}", target_fps));

    FfmpegRunner::new().run(&cmd).await?;

    let mut frames: Vec<PathBuf> = std::fs::read_dir(output_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("frame_") && n.ends_with(".png"))
                .unwrap_or(false)
        })
        .collect();
    frames.sort();

    info!("Extracted {} frames from {}", frames.len(), video.display());
    Ok(frames)
}

/// Extract a single frame at `timestamp` as a high-quality JPEG.
///
/// `crop` is a percentage box (0-100) applied after seeking; it is converted
/// to pixels against the probed dimensions and clamped to the frame.
pub async fn extract_frame(
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
    timestamp: f64,
    crop: Option<&BoundingBox>,
) -> MediaResult<PathBuf> {
    let video = video.as_ref();
    let output = output.as_ref();

    let mut cmd = FfmpegCommand::new(video, output)
        .seek(timestamp)
        .single_frame()
        .output_arg("-q:v")
        .output_arg("2");

    if let Some(box_) = crop {
        let info = probe_video(video).await?;
        cmd = cmd.video_filter(crop_filter(box_, info.width, info.height));
    }

    FfmpegRunner::new().run(&cmd).await?;
    debug!("Extracted frame at {:.2}s to {}", timestamp, output.display());
    Ok(output.to_path_buf())
}

/// Convert a percentage box to a pixel crop filter, clamped to the frame.
fn crop_filter(box_: &BoundingBox, width: u32, height: u32) -> String {
    let crop_x = ((width as f64) * (box_.left / 100.0)) as u32;
    let crop_y = ((height as f64) * (box_.top / 100.0)) as u32;
    let crop_w = ((width as f64) * (box_.width / 100.0)) as u32;
    let crop_h = ((height as f64) * (box_.height / 100.0)) as u32;

    let crop_x = crop_x.min(width.saturating_sub(1));
    let crop_y = crop_y.min(height.saturating_sub(1));
    let crop_w = crop_w.clamp(1, width - crop_x);
    let crop_h = crop_h.clamp(1, height - crop_y);

    format!("crop={}:{}:{}:{}", crop_w, crop_h, crop_x, crop_y)
}

/// Rebuild a video from a `frame_%06d.png` sequence.
///
/// Encodes yuv420p for broad player compatibility; when an audio track is
/// given it is muxed with `-shortest`.
pub async fn build_video(
    frames_dir: impl AsRef<Path>,
    output: impl AsRef<Path>,
    fps: f64,
    audio: Option<&Path>,
) -> MediaResult<PathBuf> {
    let frames_dir = frames_dir.as_ref();
    let output = output.as_ref();
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut cmd = FfmpegCommand::new(frames_dir.join("frame_%06d.png"), output)
        .framerate(format!("{}", fps));

    let audio = audio.filter(|a| a.exists());
    if let Some(audio_path) = audio {
        cmd = cmd.add_input(audio_path);
    }

    cmd = cmd
        .video_codec("libx264")
        .crf(18)
        .preset("medium")
        .pix_fmt("yuv420p");

    if audio.is_some() {
        cmd = cmd.audio_codec("aac").audio_bitrate("192k").shortest();
    }

    FfmpegRunner::new().run(&cmd).await?;
    info!("Built video {}", output.display());
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_filter_pixels() {
        let box_ = BoundingBox {
            top: 10.0,
            left: 25.0,
            width: 50.0,
            height: 40.0,
        };
        assert_eq!(crop_filter(&box_, 1280, 720), "crop=640:288:320:72");
    }

    #[test]
    fn test_crop_filter_clamped() {
        // Box extends past the right edge; width clamps to what remains.
        let box_ = BoundingBox {
            top: 0.0,
            left: 90.0,
            width: 50.0,
            height: 120.0,
        };
        assert_eq!(crop_filter(&box_, 1000, 500), "crop=100:500:900:0");
    }

    #[tokio::test]
    async fn test_extract_frames_missing_video() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_frames("/nonexistent.mp4", dir.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
