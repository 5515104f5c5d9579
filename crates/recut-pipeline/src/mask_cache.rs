//! Content-addressed mask cache.
//!
//! Masks are cached per job directory, keyed by the lowercased prompt and
//! whether they cover a clip or the full video. A cache hit issues zero
//! segmentation calls; repeated prompts over the same range reuse the file
//! byte-for-byte.

use std::path::{Path, PathBuf};

use tracing::info;

use recut_clients::{SegmentationClient, VideoSource};

use crate::error::PipelineResult;
use crate::retry::{retry_rate_limited, RetryConfig};

const SLUG_MAX_LEN: usize = 20;

/// Cache filename: `mask_{promptSlug20}_{md5(promptLower)[:8]}{_clip}?.mp4`.
///
/// The slug keeps filenames greppable; the hash is the actual key. Per-clip
/// masks are cached separately from full-video masks.
pub fn mask_filename(prompt: &str, clip: bool) -> String {
    let lower = prompt.to_lowercase();
    let digest = md5::compute(lower.as_bytes());
    let hash = format!("{:x}", digest);

    let suffix = if clip { "_clip" } else { "" };
    format!("mask_{}_{}{}.mp4", slugify(&lower), &hash[..8], suffix)
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(SLUG_MAX_LEN);
    let mut last_dash = false;
    for c in text.chars() {
        if slug.len() >= SLUG_MAX_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Return the cached mask for `(prompt, clip-ness)` or run segmentation to
/// create it. The mask file lives in the job directory and is written at
/// most once; concurrent readers are safe.
pub async fn ensure_mask(
    segmentation: &SegmentationClient,
    job_dir: &Path,
    video: VideoSource,
    prompt: &str,
    is_clip: bool,
) -> PipelineResult<PathBuf> {
    let mask_path = job_dir.join(mask_filename(prompt, is_clip));

    if mask_path.exists() {
        info!("Mask cache hit: {}", mask_path.display());
        return Ok(mask_path);
    }

    info!("Mask cache miss for '{}', running segmentation", prompt);
    let retry = RetryConfig::new("segmentation");
    let output = retry_rate_limited(&retry, || async {
        segmentation
            .segment(video.clone(), prompt, true, "green", 0.5)
            .await
            .map_err(Into::into)
    })
    .await?;

    segmentation
        .download_result(&output.mask_video_url, &mask_path)
        .await?;

    Ok(mask_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_filename_deterministic() {
        let a = mask_filename("Beer Bottle", false);
        let b = mask_filename("beer bottle", false);
        // Keyed by the lowercased prompt, so case differences collide.
        assert_eq!(a, b);
    }

    #[test]
    fn test_mask_filename_shape() {
        let name = mask_filename("cigarette", true);
        assert!(name.starts_with("mask_cigarette_"));
        assert!(name.ends_with("_clip.mp4"));
        // slug + 8 hex chars
        let hash_part = name
            .trim_start_matches("mask_cigarette_")
            .trim_end_matches("_clip.mp4");
        assert_eq!(hash_part.len(), 8);
        assert!(hash_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_clip_and_full_masks_distinct() {
        assert_ne!(mask_filename("logo", true), mask_filename("logo", false));
    }

    #[test]
    fn test_slug_truncation_and_cleanup() {
        let name = mask_filename("a very long descriptive prompt about a beer bottle", false);
        let slug = name.trim_start_matches("mask_");
        let slug = &slug[..slug.find('_').unwrap()];
        assert!(slug.len() <= SLUG_MAX_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_slugify_special_chars() {
        assert_eq!(slugify("beer & bottle!"), "beer-bottle");
        assert_eq!(slugify("  spaced  "), "spaced");
    }
}
