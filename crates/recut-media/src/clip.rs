//! Clip extraction, concatenation, fps normalization, and segment stitching.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use recut_models::VideoInfo;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Extract a time window from a video with stream copy (no re-encode).
///
/// The buffered range is clamped to `[0, duration]`. Used by the smart-clip
/// optimization so external AI calls only see the relevant window.
pub async fn extract_clip(
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start: f64,
    end: f64,
    buffer: f64,
) -> MediaResult<PathBuf> {
    let video = video.as_ref();
    let output = output.as_ref();

    let info = probe_video(video).await?;
    let buffered_start = (start - buffer).max(0.0);
    let buffered_end = (end + buffer).min(info.duration);
    let clip_duration = buffered_end - buffered_start;

    if clip_duration <= 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "Empty clip window {:.2}..{:.2} for {:.2}s video",
            buffered_start, buffered_end, info.duration
        )));
    }

    debug!(
        "Extracting clip {:.2}s..{:.2}s ({:.2}s) from {}",
        buffered_start,
        buffered_end,
        clip_duration,
        video.display()
    );

    let cmd = FfmpegCommand::new(video, output)
        .seek(buffered_start)
        .duration(clip_duration)
        .stream_copy();

    FfmpegRunner::new().run(&cmd).await?;
    Ok(output.to_path_buf())
}

/// Concatenate clips with the concat demuxer (no re-encode).
pub async fn concat_clips(
    clips: &[PathBuf],
    output: impl AsRef<Path>,
) -> MediaResult<PathBuf> {
    let output = output.as_ref();

    if clips.is_empty() {
        return Err(MediaError::internal("No clips to concatenate"));
    }

    let list_dir = output
        .parent()
        .ok_or_else(|| MediaError::internal("Output path has no parent directory"))?;
    tokio::fs::create_dir_all(list_dir).await?;

    let list_path = list_dir.join(format!(
        "concat_{}.txt",
        output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "list".to_string())
    ));
    tokio::fs::write(&list_path, concat_list(clips)).await?;

    let cmd = FfmpegCommand::new(&list_path, output)
        .input_arg("-f")
        .input_arg("concat")
        .input_arg("-safe")
        .input_arg("0")
        .stream_copy();

    let result = FfmpegRunner::new().run(&cmd).await;
    let _ = tokio::fs::remove_file(&list_path).await;
    result?;

    Ok(output.to_path_buf())
}

/// Build the concat demuxer file list. Single quotes in paths are escaped
/// per the demuxer's quoting rules.
fn concat_list(clips: &[PathBuf]) -> String {
    let mut list = String::new();
    for clip in clips {
        let escaped = clip.to_string_lossy().replace('\'', "'\\''");
        list.push_str(&format!("file '{}'\n", escaped));
    }
    list
}

/// Normalize a video's frame rate to match `target`.
///
/// Within 0.5 fps the input passes through untouched (its path is returned);
/// otherwise the video is re-encoded with an `fps` filter. Required before
/// concatenating a generative-model output into a source timeline whose fps
/// differs, or the stitched result plays at the wrong speed.
pub async fn normalize_fps(
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
    target: &VideoInfo,
) -> MediaResult<PathBuf> {
    let video = video.as_ref();
    let output = output.as_ref();

    let info = probe_video(video).await?;
    if target.fps_matches(info.fps) {
        debug!(
            "fps {:.3} within tolerance of target {:.3}, passing through",
            info.fps, target.fps
        );
        return Ok(video.to_path_buf());
    }

    info!(
        "Normalizing fps {:.3} -> {} for {}",
        info.fps,
        target.fps_rational,
        video.display()
    );

    let cmd = FfmpegCommand::new(video, output)
        .video_filter(format!("fps={}", target.fps_rational))
        .video_codec("libx264")
        .crf(18)
        .preset("fast")
        .pix_fmt("yuv420p")
        .audio_codec("aac");

    FfmpegRunner::new().run(&cmd).await?;
    Ok(output.to_path_buf())
}

/// Replace `[start-buffer, end+buffer]` of `original` with `processed`.
///
/// Splits the original into pre/post stream-copied parts around the window,
/// normalizes the processed segment to the original's frame rate, then
/// concatenates pre + processed + post via the demuxer.
pub async fn insert_segment(
    original: impl AsRef<Path>,
    processed: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start: f64,
    end: f64,
    buffer: f64,
) -> MediaResult<PathBuf> {
    let original = original.as_ref();
    let processed = processed.as_ref();
    let output = output.as_ref();

    let info = probe_video(original).await?;
    let buffered_start = (start - buffer).max(0.0);
    let buffered_end = end + buffer;

    let work_dir = tempfile::tempdir_in(
        output
            .parent()
            .ok_or_else(|| MediaError::internal("Output path has no parent directory"))?,
    )?;

    // Speed mismatches between the re-encoded segment and the source are
    // audible as desync after concat; normalize first.
    let normalized = normalize_fps(
        processed,
        work_dir.path().join("segment_normalized.mp4"),
        &info,
    )
    .await?;

    let mut parts: Vec<PathBuf> = Vec::with_capacity(3);

    if buffered_start > 0.0 {
        let before = work_dir.path().join("before.mp4");
        let cmd = FfmpegCommand::new(original, &before)
            .duration(buffered_start)
            .stream_copy();
        FfmpegRunner::new().run(&cmd).await?;
        debug!("Extracted 'before' part: 0s..{:.2}s", buffered_start);
        parts.push(before);
    }

    parts.push(normalized);

    if buffered_end < info.duration {
        let after = work_dir.path().join("after.mp4");
        let cmd = FfmpegCommand::new(original, &after)
            .seek(buffered_end)
            .stream_copy();
        FfmpegRunner::new().run(&cmd).await?;
        // A seek right at the end of the file can produce an empty stub.
        let usable = tokio::fs::metadata(&after)
            .await
            .map(|m| m.len() > 1000)
            .unwrap_or(false);
        if usable {
            debug!("Extracted 'after' part: {:.2}s..end", buffered_end);
            parts.push(after);
        }
    }

    concat_clips(&parts, output).await?;
    info!("Stitched segment into {}", output.display());
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_format() {
        let clips = vec![PathBuf::from("/tmp/a.mp4"), PathBuf::from("/tmp/b.mp4")];
        let list = concat_list(&clips);
        assert_eq!(list, "file '/tmp/a.mp4'\nfile '/tmp/b.mp4'\n");
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let clips = vec![PathBuf::from("/tmp/it's.mp4")];
        let list = concat_list(&clips);
        assert!(list.contains("'/tmp/it'\\''s.mp4'"));
    }
}
