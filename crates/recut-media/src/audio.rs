//! Audio extraction, beep synthesis, overlay mixing, and time stretching.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, run_ffprobe};

/// Overlay fade length in seconds (micro-fade against clicks at splice points).
const FADE_SECS: f64 = 0.02;

/// An audio file mixed over the base track at a fixed offset.
#[derive(Debug, Clone)]
pub struct AudioOverlay {
    pub path: PathBuf,
    /// Delay from the start of the base track, in milliseconds.
    pub start_ms: u64,
    /// Volume multiplier applied before mixing.
    pub gain: f64,
    /// Overlay duration in seconds (drives the fade-out position).
    pub duration: f64,
}

/// A window of the base track to silence.
#[derive(Debug, Clone, Copy)]
pub struct MuteWindow {
    pub start: f64,
    pub end: f64,
}

/// Extract the audio track with stream copy. Returns `None` when the video
/// has no audio stream.
pub async fn extract_audio(
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> MediaResult<Option<PathBuf>> {
    let video = video.as_ref();
    let output = output.as_ref();

    let info = probe_video(video).await?;
    if !info.has_audio {
        debug!("No audio track in {}", video.display());
        return Ok(None);
    }

    let cmd = FfmpegCommand::new(video, output)
        .no_video()
        .output_arg("-acodec")
        .output_arg("copy");

    FfmpegRunner::new().run(&cmd).await?;
    Ok(Some(output.to_path_buf()))
}

/// Probe the duration of a media file (audio or video) in seconds.
pub async fn probe_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    let probe = run_ffprobe(path).await?;
    probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| MediaError::InvalidVideo(format!("No duration for {}", path.display())))
}

/// Generate a sine-tone beep of exact duration.
pub async fn generate_beep(
    duration: f64,
    output: impl AsRef<Path>,
    frequency: u32,
    volume: f64,
) -> MediaResult<PathBuf> {
    let output = output.as_ref();

    let cmd = FfmpegCommand::new_lavfi(
        format!("sine=frequency={}:duration={:.3}", frequency, duration),
        output,
    )
    .audio_filter(format!("volume={:.2}", volume));

    FfmpegRunner::new().run(&cmd).await?;
    debug!("Generated {:.2}s beep at {}Hz", duration, frequency);
    Ok(output.to_path_buf())
}

/// Mute the listed windows on the base track (padded by `mute_padding` each
/// side) and mix the delayed overlays on top. `amix` runs with `normalize=0`
/// so mixing never ducks the bed. The video stream is copied.
pub async fn mix_audio(
    video: impl AsRef<Path>,
    overlays: &[AudioOverlay],
    mutes: &[MuteWindow],
    output: impl AsRef<Path>,
    mute_padding: f64,
) -> MediaResult<PathBuf> {
    let video = video.as_ref();
    let output = output.as_ref();

    let mut cmd = FfmpegCommand::new(video, output);
    for overlay in overlays {
        cmd = cmd.add_input(&overlay.path);
    }

    let cmd = cmd
        .filter_complex(mix_filter(overlays, mutes, mute_padding))
        .map("0:v")
        .map("[aout]")
        .video_codec("copy")
        .audio_codec("aac")
        .audio_bitrate("192k");

    FfmpegRunner::new().run(&cmd).await?;
    info!(
        "Mixed {} overlays with {} mute windows into {}",
        overlays.len(),
        mutes.len(),
        output.display()
    );
    Ok(output.to_path_buf())
}

/// Build the full mix filter graph.
fn mix_filter(overlays: &[AudioOverlay], mutes: &[MuteWindow], mute_padding: f64) -> String {
    let mut parts = Vec::with_capacity(overlays.len() + 2);

    parts.push(format!("[0:a]{}[muted]", mute_filter(mutes, mute_padding)));

    for (i, overlay) in overlays.iter().enumerate() {
        parts.push(format!(
            "[{input}:a]{chain}[ov{i}]",
            input = i + 1,
            chain = overlay_filter(overlay),
            i = i
        ));
    }

    let mut mix_inputs = String::from("[muted]");
    for i in 0..overlays.len() {
        mix_inputs.push_str(&format!("[ov{}]", i));
    }
    parts.push(format!(
        "{}amix=inputs={}:duration=first:dropout_transition=0:normalize=0[aout]",
        mix_inputs,
        overlays.len() + 1
    ));

    parts.join(";")
}

/// Volume filter silencing the padded mute windows.
fn mute_filter(mutes: &[MuteWindow], padding: f64) -> String {
    if mutes.is_empty() {
        return "anull".to_string();
    }
    let conditions: Vec<String> = mutes
        .iter()
        .map(|w| {
            format!(
                "between(t,{:.3},{:.3})",
                (w.start - padding).max(0.0),
                w.end + padding
            )
        })
        .collect();
    format!("volume=enable='{}':volume=0", conditions.join("|"))
}

/// Per-overlay gain, micro-fades, and delay.
fn overlay_filter(overlay: &AudioOverlay) -> String {
    let fade_out_start = (overlay.duration - FADE_SECS).max(0.0);
    format!(
        "volume={gain:.2},afade=t=in:st=0:d={fade:.3},afade=t=out:st={fo:.3}:d={fade:.3},adelay={ms}|{ms}",
        gain = overlay.gain,
        fade = FADE_SECS,
        fo = fade_out_start,
        ms = overlay.start_ms
    )
}

/// Time-stretch an audio file to an exact target duration, preserving pitch.
///
/// Leading/trailing silence is trimmed first so the tempo ratio reflects the
/// spoken content; the `atempo` chain is decomposed to stay within the
/// filter's `[0.5, 2.0]` domain; the result is padded/trimmed to the exact
/// target with a micro fade-out. Output duration lands within ±50 ms.
pub async fn time_stretch(
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    target_duration: f64,
) -> MediaResult<PathBuf> {
    let audio = audio.as_ref();
    let output = output.as_ref();

    if target_duration <= 0.0 {
        return Err(MediaError::internal(format!(
            "Invalid stretch target {:.3}s",
            target_duration
        )));
    }

    let work_dir = tempfile::tempdir_in(
        output
            .parent()
            .ok_or_else(|| MediaError::internal("Output path has no parent directory"))?,
    )?;

    // Pass 1: trim silence at both ends (reverse trick for the tail).
    let trimmed = work_dir.path().join("trimmed.wav");
    let trim_cmd = FfmpegCommand::new(audio, &trimmed).audio_filter(
        "silenceremove=start_periods=1:start_threshold=-50dB,\
         areverse,\
         silenceremove=start_periods=1:start_threshold=-50dB,\
         areverse",
    );
    FfmpegRunner::new().run(&trim_cmd).await?;

    let source_duration = probe_duration(&trimmed).await?;
    if source_duration <= 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "Nothing left after silence trim of {}",
            audio.display()
        )));
    }

    // Pass 2: tempo chain, exact trim, micro fade.
    let tempo = source_duration / target_duration;
    let mut filters: Vec<String> = tempo_stages(tempo)
        .into_iter()
        .map(|t| format!("atempo={:.6}", t))
        .collect();
    filters.push("apad".to_string());
    filters.push(format!("atrim=0:{:.3}", target_duration));
    filters.push(format!(
        "afade=t=out:st={:.3}:d={:.3}",
        (target_duration - FADE_SECS).max(0.0),
        FADE_SECS
    ));

    let stretch_cmd = FfmpegCommand::new(&trimmed, output).audio_filter(filters.join(","));
    FfmpegRunner::new().run(&stretch_cmd).await?;

    debug!(
        "Stretched {} from {:.3}s to {:.3}s (tempo {:.3})",
        audio.display(),
        source_duration,
        target_duration,
        tempo
    );
    Ok(output.to_path_buf())
}

/// Decompose a tempo ratio into factors inside atempo's `[0.5, 2.0]` domain.
///
/// A ratio close to 1.0 yields no stages at all.
fn tempo_stages(ratio: f64) -> Vec<f64> {
    if (ratio - 1.0).abs() < 1e-3 {
        return Vec::new();
    }

    let mut stages = Vec::new();
    let mut r = ratio;
    while r > 2.0 {
        stages.push(2.0);
        r /= 2.0;
    }
    while r < 0.5 {
        stages.push(0.5);
        r /= 0.5;
    }
    stages.push(r);
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stages: &[f64]) -> f64 {
        stages.iter().product()
    }

    #[test]
    fn test_tempo_stages_in_domain() {
        for ratio in [0.1, 0.45, 0.5, 0.9, 1.5, 2.0, 3.7, 8.4] {
            let stages = tempo_stages(ratio);
            for s in &stages {
                assert!(
                    (0.5..=2.0).contains(s),
                    "stage {} out of domain for ratio {}",
                    s,
                    ratio
                );
            }
            assert!(
                (product(&stages) - ratio).abs() < 1e-9,
                "product mismatch for ratio {}",
                ratio
            );
        }
    }

    #[test]
    fn test_tempo_stages_identity() {
        assert!(tempo_stages(1.0).is_empty());
        assert!(tempo_stages(1.0005).is_empty());
    }

    #[test]
    fn test_mute_filter_padding() {
        let mutes = vec![
            MuteWindow { start: 1.2, end: 1.5 },
            MuteWindow { start: 4.0, end: 4.8 },
        ];
        let filter = mute_filter(&mutes, 0.05);
        assert_eq!(
            filter,
            "volume=enable='between(t,1.150,1.550)|between(t,3.950,4.850)':volume=0"
        );
    }

    #[test]
    fn test_mute_filter_clamps_at_zero() {
        let filter = mute_filter(&[MuteWindow { start: 0.02, end: 0.5 }], 0.05);
        assert!(filter.contains("between(t,0.000,0.550)"));
    }

    #[test]
    fn test_overlay_filter_chain() {
        let overlay = AudioOverlay {
            path: PathBuf::from("/tmp/dub.mp3"),
            start_ms: 4000,
            gain: 1.5,
            duration: 0.8,
        };
        let chain = overlay_filter(&overlay);
        assert!(chain.starts_with("volume=1.50,"));
        assert!(chain.contains("afade=t=in:st=0:d=0.020"));
        assert!(chain.contains("afade=t=out:st=0.780:d=0.020"));
        assert!(chain.ends_with("adelay=4000|4000"));
    }

    #[test]
    fn test_mix_filter_counts_inputs() {
        let overlays = vec![
            AudioOverlay {
                path: PathBuf::from("a.wav"),
                start_ms: 1200,
                gain: 0.9,
                duration: 0.3,
            },
            AudioOverlay {
                path: PathBuf::from("b.wav"),
                start_ms: 4000,
                gain: 0.9,
                duration: 0.8,
            },
        ];
        let mutes = vec![MuteWindow { start: 1.2, end: 1.5 }];
        let filter = mix_filter(&overlays, &mutes, 0.05);
        assert!(filter.contains("[muted][ov0][ov1]amix=inputs=3"));
        assert!(filter.contains("normalize=0[aout]"));
        assert!(filter.contains("[1:a]"));
        assert!(filter.contains("[2:a]"));
    }

    #[test]
    fn test_mix_filter_no_mutes() {
        let filter = mix_filter(&[], &[], 0.05);
        assert!(filter.starts_with("[0:a]anull[muted]"));
        assert!(filter.contains("amix=inputs=1"));
    }
}
