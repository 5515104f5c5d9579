//! Beep censoring: sine tones over merged profanity windows.

use std::path::PathBuf;

use tracing::info;

use recut_media::{generate_beep, mix_audio, AudioOverlay, MuteWindow};
use recut_models::{Job, ProfanityMatch};

use crate::error::PipelineResult;
use crate::orchestrator::Pipeline;
use crate::smart_clip::short_tag;

/// Parameters for the beep operation.
#[derive(Debug, Clone, Default)]
pub struct BeepParams {
    /// Extra words to detect beyond standard profanity.
    pub custom_words: Vec<String>,
}

/// Overlay beeps for the given (already merged) matches. Returns `None`
/// when there is nothing to censor, leaving the job output untouched.
pub async fn run(
    pipeline: &Pipeline,
    job: &Job,
    matches: &[ProfanityMatch],
) -> PipelineResult<Option<PathBuf>> {
    if matches.is_empty() {
        info!(job_id = %job.id, "No profanity found, beep is a no-op");
        return Ok(None);
    }

    info!(job_id = %job.id, "Beeping {} profanity window(s)", matches.len());

    let source = job.current_source().to_path_buf();
    let mut overlays = Vec::with_capacity(matches.len());
    let mut mutes = Vec::with_capacity(matches.len());

    for (i, m) in matches.iter().enumerate() {
        let beep_path = job.job_dir.join(format!("beep_{}.wav", i));
        generate_beep(
            m.duration(),
            &beep_path,
            pipeline.config.beep_frequency,
            pipeline.config.beep_volume,
        )
        .await?;

        overlays.push(AudioOverlay {
            path: beep_path,
            start_ms: (m.start_time * 1000.0) as u64,
            gain: 1.0,
            duration: m.duration(),
        });
        mutes.push(MuteWindow {
            start: m.start_time,
            end: m.end_time,
        });
    }

    let output = job.job_dir.join(format!("beeped_{}.mp4", short_tag()));
    mix_audio(
        &source,
        &overlays,
        &mutes,
        &output,
        pipeline.config.mute_padding_seconds,
    )
    .await?;

    Ok(Some(output))
}
