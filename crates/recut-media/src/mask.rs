//! Masked blur/pixelate compositing.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Which luma value marks the affected region in a mask video.
///
/// Segmentation backends disagree on this; the composite step takes it as a
/// knob instead of assuming one convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskPolarity {
    /// White pixels mark the region to affect (the common convention).
    #[default]
    WhiteIsTarget,
    /// Black pixels mark the region to affect.
    BlackIsTarget,
}

/// Effect applied to the masked region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskEffect {
    /// Box blur with the given radius.
    Blur { radius: u32 },
    /// Mosaic pixelation with the given block size.
    Pixelate { block: u32 },
}

/// Apply an effect to the masked region of a video.
///
/// The mask is rescaled to the video's exact dimensions with `scale2ref`;
/// outside the mask the output is the untouched input (modulo codec). Audio
/// is copied through when the input carries a track.
pub async fn apply_mask_effect(
    video: impl AsRef<Path>,
    mask: impl AsRef<Path>,
    output: impl AsRef<Path>,
    effect: MaskEffect,
    polarity: MaskPolarity,
) -> MediaResult<PathBuf> {
    let video = video.as_ref();
    let mask = mask.as_ref();
    let output = output.as_ref();
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let filter = match effect {
        MaskEffect::Blur { radius } => blur_filter(radius, polarity),
        MaskEffect::Pixelate { block } => pixelate_filter(block, polarity),
    };

    let cmd = FfmpegCommand::new(video, output)
        .add_input(mask)
        .filter_complex(filter)
        .map("[out]")
        .map("0:a?")
        .video_codec("libx264")
        .crf(18)
        .preset("fast")
        .pix_fmt("yuv420p")
        .audio_codec("copy");

    FfmpegRunner::new().run(&cmd).await?;
    info!("Applied {:?} to masked region of {}", effect, video.display());
    Ok(output.to_path_buf())
}

/// `maskedmerge` picks its second input where the mask is white, so a
/// white-is-target mask must be negated to keep the clean video there.
fn mask_select(polarity: MaskPolarity) -> &'static str {
    match polarity {
        MaskPolarity::WhiteIsTarget => "format=gray,negate",
        MaskPolarity::BlackIsTarget => "format=gray",
    }
}

fn blur_filter(radius: u32, polarity: MaskPolarity) -> String {
    format!(
        "[0:v]split[toscale][toblur];\
         [toblur]boxblur={radius}:1[effected];\
         [1:v][toscale]scale2ref[mask_scaled][base];\
         [mask_scaled]{select}[mask_sel];\
         [effected][base][mask_sel]maskedmerge[out]",
        radius = radius,
        select = mask_select(polarity),
    )
}

fn pixelate_filter(block: u32, polarity: MaskPolarity) -> String {
    // Downscale by the block size with nearest-neighbor, then scale back up
    // against the base with scale2ref so rounding never desyncs dimensions.
    format!(
        "[1:v][0:v]scale2ref[mask_scaled][base0];\
         [base0]split[base][topix];\
         [topix]scale=iw/{block}:ih/{block}:flags=neighbor[small];\
         [small][base]scale2ref=flags=neighbor[effected][base_ready];\
         [mask_scaled]{select}[mask_sel];\
         [effected][base_ready][mask_sel]maskedmerge[out]",
        block = block,
        select = mask_select(polarity),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blur_filter_negates_white_target() {
        let filter = blur_filter(30, MaskPolarity::WhiteIsTarget);
        assert!(filter.contains("boxblur=30:1"));
        assert!(filter.contains("format=gray,negate"));
        assert!(filter.contains("maskedmerge[out]"));
    }

    #[test]
    fn test_blur_filter_black_target_skips_negate() {
        let filter = blur_filter(30, MaskPolarity::BlackIsTarget);
        assert!(!filter.contains("negate"));
    }

    #[test]
    fn test_pixelate_filter_block_size() {
        let filter = pixelate_filter(16, MaskPolarity::WhiteIsTarget);
        assert!(filter.contains("scale=iw/16:ih/16:flags=neighbor"));
        assert!(filter.contains("scale2ref=flags=neighbor"));
        assert!(filter.contains("maskedmerge[out]"));
    }
}
