//! Smart-clip + stitch fabric shared by every time-ranged operation.
//!
//! Select the chain source, extract only the relevant window, run the
//! operation on the short clip, then splice the result back into the source
//! timeline (with fps normalization handled by the stitcher). Operations
//! without a window process the whole source and return their result as-is.

use std::future::Future;
use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

use recut_media::{extract_clip, insert_segment};
use recut_models::Job;

use crate::error::{PipelineError, PipelineResult};

/// A requested edit window in source-video seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    pub start: f64,
    pub end: f64,
}

impl ClipWindow {
    /// Build a window from optional request fields; both-or-neither.
    pub fn from_params(start: Option<f64>, end: Option<f64>) -> PipelineResult<Option<Self>> {
        match (start, end) {
            (Some(start), Some(end)) if end > start && start >= 0.0 => {
                Ok(Some(Self { start, end }))
            }
            (Some(_), Some(_)) => Err(PipelineError::input(
                "invalid time window: end must be after a non-negative start",
            )),
            (None, None) => Ok(None),
            _ => Err(PipelineError::input(
                "start and end must be provided together",
            )),
        }
    }
}

/// Run `process` on the relevant portion of the job's chain source.
///
/// With a window: extract the buffered clip, process it, stitch the result
/// back, and return the stitched full-length video. Without: process the
/// full source. `process` receives the input path and whether it is a clip.
pub async fn with_smart_clip<F, Fut>(
    job: &Job,
    window: Option<ClipWindow>,
    buffer: f64,
    process: F,
) -> PipelineResult<PathBuf>
where
    F: FnOnce(PathBuf, bool) -> Fut,
    Fut: Future<Output = PipelineResult<PathBuf>>,
{
    let source = job.current_source().to_path_buf();

    match window {
        Some(w) => {
            let tag = short_tag();
            let clip_path = job
                .job_dir
                .join(format!("clip_{:.2}_{:.2}_{}.mp4", w.start, w.end, tag));
            debug!(
                "Smart clip: window {:.2}..{:.2} (buffer {:.1}s) of {}",
                w.start,
                w.end,
                buffer,
                source.display()
            );
            extract_clip(&source, &clip_path, w.start, w.end, buffer).await?;

            let processed = process(clip_path, true).await?;

            let final_path = job.job_dir.join(format!("stitched_{}.mp4", tag));
            insert_segment(&source, &processed, &final_path, w.start, w.end, buffer).await?;
            Ok(final_path)
        }
        None => process(source, false).await,
    }
}

/// Short unique tag for intermediate filenames, so chained edits never
/// overwrite each other's artifacts.
pub fn short_tag() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_requires_both_bounds() {
        assert!(ClipWindow::from_params(Some(1.0), None).is_err());
        assert!(ClipWindow::from_params(None, Some(5.0)).is_err());
        assert!(ClipWindow::from_params(None, None).unwrap().is_none());
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(ClipWindow::from_params(Some(5.0), Some(3.0)).is_err());
        assert!(ClipWindow::from_params(Some(-1.0), Some(3.0)).is_err());
        let w = ClipWindow::from_params(Some(3.0), Some(5.0)).unwrap().unwrap();
        assert_eq!(w, ClipWindow { start: 3.0, end: 5.0 });
    }

    #[test]
    fn test_short_tag_format() {
        let tag = short_tag();
        assert_eq!(tag.len(), 8);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
