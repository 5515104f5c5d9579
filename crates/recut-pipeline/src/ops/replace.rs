//! Generative object replacement with chunked processing.
//!
//! The generative backend rejects long clips, so anything past the safe
//! chunk length is sliced into consecutive chunks, edited one by one, each
//! result trimmed back to its exact source duration (backends over-produce),
//! concatenated, and stitched into the source timeline. A reference image is
//! uploaded once and passed to every chunk call as the first-frame anchor so
//! the replacement object keeps its identity across chunks.

use std::path::{Path, PathBuf};

use tracing::info;

use recut_clients::EditRequest;
use recut_media::{concat_clips, extract_clip, probe_duration};
use recut_models::Job;

use crate::chunking::plan_chunks;
use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::Pipeline;
use crate::retry::{retry_rate_limited, RetryConfig};
use crate::smart_clip::{short_tag, with_smart_clip, ClipWindow};

/// Tolerance before a chunk result is considered over-produced.
const TRIM_EPSILON: f64 = 0.1;

/// Parameters for the generative replace operation.
#[derive(Debug, Clone)]
pub struct ReplaceParams {
    pub prompt: String,
    /// Already-public reference image URL for grounded replacement.
    pub reference_image_url: Option<String>,
    /// Local reference image; uploaded once and reused per chunk.
    pub reference_image: Option<PathBuf>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

pub async fn run(pipeline: &Pipeline, job: &Job, params: &ReplaceParams) -> PipelineResult<PathBuf> {
    if pipeline.storage.is_none() {
        return Err(PipelineError::missing_prerequisite(
            "Generative replacement needs blob storage for public input URLs",
        ));
    }

    let window = ClipWindow::from_params(params.start, params.end)?;

    // The reference is uploaded once; every chunk call reuses the same URL.
    let reference_url = match (&params.reference_image_url, &params.reference_image) {
        (Some(url), _) => Some(url.clone()),
        (None, Some(image)) => Some(upload_for_backend(pipeline, job, image, "reference").await?),
        (None, None) => None,
    };

    with_smart_clip(job, window, pipeline.config.clip_buffer_seconds, |input, _is_clip| {
        let reference_url = reference_url.clone();
        async move {
            let duration = probe_duration(&input).await?;
            let chunks = plan_chunks(duration, pipeline.config.chunk_seconds);
            info!(
                job_id = %job.id,
                "Generative replace over {:.2}s in {} chunk(s)",
                duration,
                chunks.len()
            );

            let mut processed: Vec<PathBuf> = Vec::with_capacity(chunks.len());

            for (i, chunk) in chunks.iter().enumerate() {
                let chunk_path = if chunks.len() == 1 {
                    input.clone()
                } else {
                    let path = job
                        .job_dir
                        .join(format!("chunk_{:.2}_{:.2}.mp4", chunk.start, chunk.end()));
                    // Strict cut: chunk boundaries must line up exactly.
                    extract_clip(&input, &path, chunk.start, chunk.end(), 0.0).await?;
                    path
                };

                let chunk_url = upload_for_backend(pipeline, job, &chunk_path, "chunk").await?;

                let request = EditRequest {
                    video_url: chunk_url,
                    prompt: params.prompt.clone(),
                    mask_video_url: None,
                    reference_image_url: reference_url.clone(),
                    seconds: chunk.duration.ceil() as u32,
                    aspect_ratio: "16:9".to_string(),
                };

                let retry = RetryConfig::new("generative-edit");
                let output_url = retry_rate_limited(&retry, || async {
                    pipeline
                        .generative
                        .edit(request.clone())
                        .await
                        .map_err(Into::into)
                })
                .await?;

                let raw_path = job.job_dir.join(format!("processed_chunk_{}.mp4", i));
                pipeline
                    .generative
                    .download_result(&output_url, &raw_path)
                    .await?;

                processed.push(trim_to_duration(job, &raw_path, chunk.duration, i).await?);
            }

            if processed.len() == 1 {
                Ok(processed.remove(0))
            } else {
                let joined = job.job_dir.join(format!("replaced_{}.mp4", short_tag()));
                concat_clips(&processed, &joined).await?;
                Ok(joined)
            }
        }
    })
    .await
}

/// Backends over-produce; trim a chunk result to its exact source duration
/// so downstream concat stays frame-aligned with the timeline.
async fn trim_to_duration(
    job: &Job,
    path: &Path,
    target: f64,
    index: usize,
) -> PipelineResult<PathBuf> {
    let actual = probe_duration(path).await?;
    if (actual - target).abs() <= TRIM_EPSILON {
        return Ok(path.to_path_buf());
    }

    info!(
        job_id = %job.id,
        "Trimming chunk {} from {:.2}s to {:.2}s",
        index,
        actual,
        target
    );
    let trimmed = job
        .job_dir
        .join(format!("processed_chunk_{}_trimmed.mp4", index));
    extract_clip(path, &trimmed, 0.0, target, 0.0).await?;
    Ok(trimmed)
}

/// Upload an artifact and hand back the best URL the backend can fetch.
///
/// When no URL can be signed or served publicly, small payloads fall back
/// to an inline data URI; larger ones surface `Unsignable`.
async fn upload_for_backend(
    pipeline: &Pipeline,
    job: &Job,
    path: &Path,
    kind: &str,
) -> PipelineResult<String> {
    let storage = pipeline
        .storage
        .as_ref()
        .ok_or_else(|| PipelineError::missing_prerequisite("Blob storage not configured"))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    let content_type = match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "video/mp4",
    };
    let key = format!("jobs/{}/{}_{}.{}", job.id, kind, short_tag(), extension);

    storage.upload_file(path, &key, content_type).await?;
    match storage.url_for(&key, pipeline.config.url_ttl).await {
        Ok(url) => Ok(url),
        Err(recut_storage::StorageError::SignFailed(reason)) => {
            info!(job_id = %job.id, "No URL available ({}), inlining as data URI", reason);
            let bytes = tokio::fs::read(path).await?;
            Ok(recut_storage::data_uri(&bytes, content_type)?)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_epsilon_is_sub_frame_safe() {
        // At 30 fps a frame is ~33 ms; the 100 ms epsilon only skips trims
        // that would change nothing visible.
        assert!(TRIM_EPSILON > 1.0 / 30.0);
        assert!(TRIM_EPSILON < 0.2);
    }
}
