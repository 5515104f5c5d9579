//! Blur/pixelate an object found by text prompt.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use recut_clients::VideoSource;
use recut_media::{apply_mask_effect, MaskEffect, MaskPolarity};
use recut_models::Job;

use crate::error::PipelineResult;
use crate::mask_cache::ensure_mask;
use crate::orchestrator::Pipeline;
use crate::smart_clip::{short_tag, with_smart_clip, ClipWindow};

/// Obscuring effect requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Blur,
    Pixelate,
}

/// Parameters for the blur/pixelate operation.
#[derive(Debug, Clone)]
pub struct BlurParams {
    /// What to find; may be a whole violation description, which is first
    /// distilled into a concrete noun for the segmentation model.
    pub prompt: String,
    /// Effect strength, 1-100.
    pub strength: u32,
    pub effect: EffectKind,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

/// Box-blur radius: strength passes through, clamped to a usable range.
pub fn blur_radius(strength: u32) -> u32 {
    strength.clamp(10, 100)
}

/// Pixelate block size: monotonically inverse in strength, never below 8
/// (smaller blocks stop reading as censorship).
pub fn pixelate_block(strength: u32) -> u32 {
    (64 / (strength / 10 + 1)).max(8)
}

pub async fn run(pipeline: &Pipeline, job: &Job, params: &BlurParams) -> PipelineResult<PathBuf> {
    let window = ClipWindow::from_params(params.start, params.end)?;

    let object_prompt = pipeline.analyzer.simplify_prompt(&params.prompt).await?;
    info!(job_id = %job.id, "Applying {:?} to '{}'", params.effect, object_prompt);

    let effect = match params.effect {
        EffectKind::Blur => MaskEffect::Blur {
            radius: blur_radius(params.strength),
        },
        EffectKind::Pixelate => MaskEffect::Pixelate {
            block: pixelate_block(params.strength),
        },
    };

    with_smart_clip(job, window, pipeline.config.clip_buffer_seconds, |input, is_clip| {
        let object_prompt = object_prompt.clone();
        async move {
            // Full-video masks can reuse the cloud copy of the source; clip
            // masks always ship the local clip.
            let video = if !is_clip {
                match &job.source_url {
                    Some(url) if job.output_path.is_none() => VideoSource::Url(url.clone()),
                    _ => VideoSource::File(input.clone()),
                }
            } else {
                VideoSource::File(input.clone())
            };

            let mask = ensure_mask(
                &pipeline.segmentation,
                &job.job_dir,
                video,
                &object_prompt,
                is_clip,
            )
            .await?;

            let out = job.job_dir.join(format!("masked_{}.mp4", short_tag()));
            apply_mask_effect(&input, &mask, &out, effect, MaskPolarity::WhiteIsTarget).await?;
            Ok(out)
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blur_radius_passthrough_with_clamp() {
        assert_eq!(blur_radius(30), 30);
        assert_eq!(blur_radius(3), 10);
        assert_eq!(blur_radius(250), 100);
    }

    #[test]
    fn test_pixelate_block_monotonic_inverse() {
        // Higher strength, smaller (or equal) blocks, floored at 8.
        let blocks: Vec<u32> = [10, 30, 50, 70, 100].iter().map(|s| pixelate_block(*s)).collect();
        for pair in blocks.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
        assert_eq!(pixelate_block(10), 32);
        assert_eq!(pixelate_block(100), 8);
        assert!(pixelate_block(1000) >= 8);
    }
}
