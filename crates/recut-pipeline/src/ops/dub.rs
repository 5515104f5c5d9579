//! Voice-dub censoring: replacement speech over merged profanity phrases.
//!
//! Matches are clustered into same-speaker phrases, each phrase is spoken by
//! the chosen voice, time-stretched to the exact phrase window, and mixed
//! over the muted original. A cloned voice is a shared cloud resource and is
//! deleted on every exit path, success or failure, so TTS quota never leaks.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{info, warn};

use recut_media::{extract_audio, extract_clip, mix_audio, time_stretch, AudioOverlay, MuteWindow};
use recut_models::{cluster_phrases, DubPhrase, Job, ProfanityMatch};

use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::Pipeline;
use crate::retry::{retry_rate_limited, RetryConfig};
use crate::smart_clip::short_tag;

/// Which voice speaks the replacements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceChoice {
    /// A configured preset ("male" / "female").
    Preset(String),
    /// Clone the speaker from a sample window of the source video.
    Clone,
}

/// Parameters for the dub operation.
#[derive(Debug, Clone)]
pub struct DubParams {
    pub custom_words: Vec<String>,
    /// Per-word replacement overrides, keyed by the spoken word.
    pub custom_replacements: HashMap<String, String>,
    pub voice: VoiceChoice,
    /// Sample window `(start, end)` for voice cloning.
    pub voice_sample: Option<(f64, f64)>,
}

/// Apply `custom_replacements` to matches (case-insensitive on the word).
pub fn apply_replacements(
    matches: Vec<ProfanityMatch>,
    replacements: &HashMap<String, String>,
) -> Vec<ProfanityMatch> {
    if replacements.is_empty() {
        return matches;
    }
    let lowered: HashMap<String, &String> = replacements
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    matches
        .into_iter()
        .map(|mut m| {
            if let Some(replacement) = lowered.get(&m.word.to_lowercase()) {
                m.replacement = (*replacement).clone();
            }
            m
        })
        .collect()
}

/// Dub the given (already merged) matches. Returns `None` when there is
/// nothing to censor.
pub async fn run(
    pipeline: &Pipeline,
    job: &Job,
    matches: Vec<ProfanityMatch>,
    params: &DubParams,
) -> PipelineResult<Option<PathBuf>> {
    if matches.is_empty() {
        info!(job_id = %job.id, "No profanity found, dub is a no-op");
        return Ok(None);
    }

    let matches = apply_replacements(matches, &params.custom_replacements);
    let phrases = cluster_phrases(&matches, pipeline.config.phrase_gap_seconds);
    info!(
        job_id = %job.id,
        "Dubbing {} match(es) as {} phrase(s)",
        matches.len(),
        phrases.len()
    );

    let (voice_id, cloned) = resolve_voice(pipeline, job, params).await?;

    // Clone deletion must run on every path from here on.
    let result = dub_phrases(pipeline, job, &phrases, &voice_id).await;

    if let Some(cloned_id) = cloned {
        if let Err(e) = pipeline.tts.delete_voice(&cloned_id).await {
            warn!(job_id = %job.id, "Failed to delete cloned voice {}: {}", cloned_id, e);
        }
    }

    result.map(Some)
}

/// Resolve the voice id; returns `(voice_id, cloned_id_to_delete)`.
async fn resolve_voice(
    pipeline: &Pipeline,
    job: &Job,
    params: &DubParams,
) -> PipelineResult<(String, Option<String>)> {
    match &params.voice {
        VoiceChoice::Preset(name) => Ok((
            pipeline.config.voice_presets.resolve(name).to_string(),
            None,
        )),
        VoiceChoice::Clone => {
            let (start, end) = params.voice_sample.ok_or_else(|| {
                PipelineError::missing_prerequisite(
                    "Voice cloning needs a voiceSampleStart/voiceSampleEnd window",
                )
            })?;
            if end <= start {
                return Err(PipelineError::input("Voice sample window is empty"));
            }
            if end - start < pipeline.config.min_clone_sample_seconds {
                warn!(
                    job_id = %job.id,
                    "Voice sample of {:.1}s is below the recommended {:.0}s; clone quality may suffer",
                    end - start,
                    pipeline.config.min_clone_sample_seconds
                );
            }

            let sample_clip = job.job_dir.join(format!("voice_sample_{}.mp4", short_tag()));
            extract_clip(job.current_source(), &sample_clip, start, end, 0.0).await?;

            let sample_audio = sample_clip.with_extension("aac");
            let audio = extract_audio(&sample_clip, &sample_audio)
                .await?
                .ok_or_else(|| {
                    PipelineError::missing_prerequisite("Source video has no audio track to clone")
                })?;

            let name = format!("recut-{}", job.id);
            let voice_id = pipeline.tts.clone_voice(&audio, &name).await?;
            Ok((voice_id.clone(), Some(voice_id)))
        }
    }
}

async fn dub_phrases(
    pipeline: &Pipeline,
    job: &Job,
    phrases: &[DubPhrase],
    voice_id: &str,
) -> PipelineResult<PathBuf> {
    let source = job.current_source().to_path_buf();
    let mut overlays = Vec::with_capacity(phrases.len());
    let mut mutes = Vec::with_capacity(phrases.len());

    for (i, phrase) in phrases.iter().enumerate() {
        let raw = job.job_dir.join(format!("dub_raw_{}.mp3", i));
        let retry = RetryConfig::new("tts-speak");
        retry_rate_limited(&retry, || async {
            pipeline
                .tts
                .speak(&phrase.phrase, voice_id, &raw)
                .await
                .map_err(Into::into)
        })
        .await?;

        let stretched = job.job_dir.join(format!("dub_stretched_{}.mp3", i));
        time_stretch(&raw, &stretched, phrase.duration()).await?;

        overlays.push(AudioOverlay {
            path: stretched,
            start_ms: (phrase.start_time * 1000.0) as u64,
            gain: pipeline.config.dub_gain,
            duration: phrase.duration(),
        });
        mutes.push(MuteWindow {
            start: phrase.start_time,
            end: phrase.end_time,
        });
    }

    let output = job.job_dir.join(format!("dubbed_{}.mp4", short_tag()));
    mix_audio(
        &source,
        &overlays,
        &mutes,
        &output,
        pipeline.config.dub_mute_padding_seconds,
    )
    .await?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recut_models::Confidence;

    fn m(word: &str, replacement: &str) -> ProfanityMatch {
        ProfanityMatch {
            word: word.to_string(),
            start_time: 1.0,
            end_time: 1.5,
            replacement: replacement.to_string(),
            confidence: Confidence::High,
            context: String::new(),
            speaker_id: None,
        }
    }

    #[test]
    fn test_apply_replacements_case_insensitive() {
        let mut replacements = HashMap::new();
        replacements.insert("Damn".to_string(), "darn".to_string());

        let out = apply_replacements(vec![m("damn", "dang"), m("hell", "heck")], &replacements);
        assert_eq!(out[0].replacement, "darn");
        assert_eq!(out[1].replacement, "heck");
    }

    #[test]
    fn test_apply_replacements_empty_is_identity() {
        let matches = vec![m("damn", "dang")];
        let out = apply_replacements(matches.clone(), &HashMap::new());
        assert_eq!(out, matches);
    }
}
