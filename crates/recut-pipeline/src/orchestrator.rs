//! Pipeline orchestrator: the public facade over jobs and operations.
//!
//! Owns the job store and the external-service clients. Every mutating
//! operation runs under the job's operation lock, persists state on each
//! stage transition, and chains on the job's latest output. Uploads return
//! immediately; full frame extraction happens in a background task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use recut_clients::{AnalyzerClient, GenerativeEditClient, SegmentationClient, TtsClient};
use recut_media::{extract_audio, extract_frame, extract_frames, probe_video};
use recut_models::{
    merge_adjacent, BoundingBox, Job, JobId, ProfanityCache, ProfanityMatch, RegionAnalysis,
    Stage, VideoAnalysis, VideoInfo,
};
use recut_storage::GcsClient;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ops;
use crate::ops::beep::BeepParams;
use crate::ops::blur::BlurParams;
use crate::ops::dub::DubParams;
use crate::ops::replace::ReplaceParams;
use crate::retry::{retry_rate_limited, RetryConfig};
use crate::smart_clip::short_tag;
use crate::store::JobStore;

/// Accepted upload containers.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

/// The orchestrator.
pub struct Pipeline {
    pub(crate) config: PipelineConfig,
    pub(crate) store: JobStore,
    pub(crate) storage: Option<Arc<GcsClient>>,
    pub(crate) segmentation: SegmentationClient,
    pub(crate) generative: GenerativeEditClient,
    pub(crate) tts: TtsClient,
    pub(crate) analyzer: AnalyzerClient,
}

/// Result of an upload: enough for the client to start editing.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub job_id: JobId,
    pub video_info: VideoInfo,
    pub preview_path: PathBuf,
}

/// Result of an edit operation.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub job_id: JobId,
    pub download_path: String,
    pub message: String,
}

/// Result of an audio censor operation.
#[derive(Debug, Clone)]
pub struct CensorOutcome {
    pub job_id: JobId,
    pub matches: Vec<ProfanityMatch>,
    /// `None` when nothing needed censoring (output unchanged).
    pub download_path: Option<String>,
    pub message: String,
}

/// Snapshot for status polling.
#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub stage: Stage,
    pub progress: u8,
    pub error: Option<String>,
}

/// A replacement suggestion for one word.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub original: String,
    pub alternatives: Vec<String>,
    pub duration: f64,
}

impl Pipeline {
    /// Build the orchestrator from config and an optional blob store.
    pub fn new(config: PipelineConfig, storage: Option<GcsClient>) -> Self {
        let storage = storage.map(Arc::new);
        Self {
            store: JobStore::new(&config.storage_dir, storage.clone()),
            segmentation: SegmentationClient::new(
                config.segmentation_api_token.clone(),
                config.segmentation_model_version.clone(),
            ),
            generative: GenerativeEditClient::new(config.generative_api_key.clone()),
            tts: TtsClient::new(config.tts_api_key.clone()),
            analyzer: AnalyzerClient::new(config.analyzer_api_key.clone()),
            storage,
            config,
        }
    }

    /// Access the job store (tests, admin tooling).
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Accept an upload, create its job, probe it, extract a preview frame,
    /// and schedule full frame extraction in the background. Returns before
    /// extraction completes.
    pub async fn upload(
        self: &Arc<Self>,
        data: Vec<u8>,
        extension: &str,
    ) -> PipelineResult<UploadOutcome> {
        let extension = extension.trim_start_matches('.').to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(PipelineError::input(format!(
                "Unsupported extension '.{}'; accepted: {}",
                extension,
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        tokio::fs::create_dir_all(&self.config.storage_dir).await?;
        let incoming = self
            .config
            .storage_dir
            .join(format!("incoming_{}.{}", short_tag(), extension));
        tokio::fs::write(&incoming, &data).await?;

        let result = self.create_job_from(&incoming).await;
        let _ = tokio::fs::remove_file(&incoming).await;
        let mut job = result?;

        let info = match probe_video(&job.source_video_path).await {
            Ok(info) => info,
            Err(e) => {
                // An unprobeable upload leaves nothing worth keeping.
                let _ = self.store.delete(&job.id).await;
                return Err(e.into());
            }
        };
        if info.duration > self.config.max_video_seconds {
            let id = job.id.clone();
            let _ = self.store.delete(&id).await;
            return Err(PipelineError::input(format!(
                "Video is {:.0}s; the maximum is {:.0}s",
                info.duration, self.config.max_video_seconds
            )));
        }

        let preview_path = job.job_dir.join("preview.jpg");
        extract_frame(&job.source_video_path, &preview_path, 0.0, None).await?;

        job.video_info = Some(info.clone());
        self.store.save(&job).await;

        // Full extraction runs as a background task so the upload returns
        // immediately; status polls observe its progress.
        let pipeline = Arc::clone(self);
        let job_id = job.id.clone();
        tokio::spawn(async move {
            pipeline.extract_frames_task(job_id).await;
        });

        Ok(UploadOutcome {
            job_id: job.id,
            video_info: info,
            preview_path,
        })
    }

    async fn create_job_from(&self, incoming: &std::path::Path) -> PipelineResult<Job> {
        // Prior jobs are garbage-collected on upload; disk is the scarce
        // resource, not job history.
        self.store.create(incoming, true).await
    }

    /// Background frame + audio extraction for a fresh upload.
    async fn extract_frames_task(self: Arc<Self>, job_id: JobId) {
        let lock = self.store.op_lock(&job_id).await;
        let _guard = lock.lock().await;

        let mut job = match self.store.get(&job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, "Frame extraction skipped: {}", e);
                return;
            }
        };

        job.set_stage(Stage::ExtractingFrames, 5);
        self.store.save(&job).await;

        let result = async {
            let frames =
                extract_frames(&job.source_video_path, &job.frames_dir, None).await?;
            let audio_path = job.job_dir.join("audio.aac");
            let audio = extract_audio(&job.source_video_path, &audio_path).await?;
            Ok::<_, PipelineError>((frames, audio))
        }
        .await;

        match result {
            Ok((frames, audio)) => {
                info!(job_id = %job.id, "Extracted {} frames", frames.len());
                job.frame_paths = frames;
                job.audio_path = audio;
                job.set_stage(Stage::Initialized, 15);
                self.store.save(&job).await;
            }
            Err(e) => {
                error!(job_id = %job.id, "Frame extraction failed: {}", e);
                job.fail(e.to_string());
                self.store.save(&job).await;
            }
        }
    }

    /// Reuse a previously uploaded video by its cloud URL.
    ///
    /// The job id is parsed back out of the `jobs/{id}/...` key; recovery
    /// (including lazy source re-download) is the store's job.
    pub async fn use_existing_video(&self, source_url: &str) -> PipelineResult<Job> {
        let id = parse_job_id_from_url(source_url).ok_or_else(|| {
            PipelineError::input(format!("Unrecognized source URL: {}", source_url))
        })?;
        self.store.get(&id).await
    }

    /// Current stage/progress/error for polling.
    pub async fn status(&self, id: &JobId) -> PipelineResult<StatusInfo> {
        let job = self.store.get(id).await?;
        Ok(StatusInfo {
            stage: job.stage,
            progress: job.progress,
            error: job.error,
        })
    }

    /// The file served for download: latest edit, else the source.
    pub async fn download_path(&self, id: &JobId) -> PipelineResult<PathBuf> {
        let job = self.store.get(id).await?;
        let path = job.current_source().to_path_buf();
        if !path.exists() {
            return Err(PipelineError::not_found(format!(
                "No downloadable video for job {}",
                id
            )));
        }
        Ok(path)
    }

    /// Path of an extracted preview frame (1-based frame files, 0-based index).
    pub async fn preview_frame(&self, id: &JobId, index: usize) -> PipelineResult<PathBuf> {
        let job = self.store.get(id).await?;
        let path = if let Some(frame) = job.frame_paths.get(index) {
            frame.clone()
        } else {
            job.frames_dir.join(format!("frame_{:06}.png", index + 1))
        };
        if !path.exists() {
            return Err(PipelineError::not_found(format!(
                "Frame {} not available for job {}",
                index, id
            )));
        }
        Ok(path)
    }

    /// Delete a job and all its artifacts.
    pub async fn delete_job(&self, id: &JobId) -> PipelineResult<()> {
        self.store.delete(id).await
    }

    /// Full-video compliance analysis (runs on the latest output).
    pub async fn analyze_video(&self, id: &JobId) -> PipelineResult<VideoAnalysis> {
        let lock = self.store.op_lock(id).await;
        let _guard = lock.lock().await;
        let mut job = self.store.get(id).await?;

        job.error = None;
        job.set_stage(Stage::Analyzing, 10);
        self.store.save(&job).await;

        let retry = RetryConfig::new("analyze-video");
        let source = job.current_source().to_path_buf();
        let result = retry_rate_limited(&retry, || async {
            self.analyzer.analyze_video(&source).await.map_err(Into::into)
        })
        .await;

        match result {
            Ok(analysis) => {
                job.set_stage(Stage::Completed, 100);
                self.store.save(&job).await;
                Ok(analysis)
            }
            Err(e) => {
                job.fail(e.to_string());
                self.store.save(&job).await;
                Err(e)
            }
        }
    }

    /// Profanity analysis with job-level caching; returns merged matches.
    pub async fn analyze_audio(
        &self,
        id: &JobId,
        custom_words: &[String],
    ) -> PipelineResult<Vec<ProfanityMatch>> {
        let lock = self.store.op_lock(id).await;
        let _guard = lock.lock().await;
        let mut job = self.store.get(id).await?;

        let result = self.matches_for(&mut job, custom_words).await;
        match result {
            Ok(matches) => {
                if job.stage == Stage::Analyzing {
                    job.set_stage(Stage::Completed, 100);
                    self.store.save(&job).await;
                }
                Ok(merge_adjacent(matches, self.config.merge_gap_seconds))
            }
            Err(e) => {
                job.fail(e.to_string());
                self.store.save(&job).await;
                Err(e)
            }
        }
    }

    /// Identify the object inside a user-drawn box on one frame.
    pub async fn analyze_region(
        &self,
        id: &JobId,
        timestamp: f64,
        box_: &BoundingBox,
    ) -> PipelineResult<RegionAnalysis> {
        let job = self.store.get(id).await?;
        let frame = job
            .job_dir
            .join(format!("region_{}.jpg", short_tag()));
        extract_frame(job.current_source(), &frame, timestamp, None).await?;

        let retry = RetryConfig::new("analyze-region");
        let analysis = retry_rate_limited(&retry, || async {
            self.analyzer
                .analyze_region(&frame, box_)
                .await
                .map_err(Into::into)
        })
        .await?;
        Ok(analysis)
    }

    /// Cached-or-fresh raw matches for the current source.
    async fn matches_for(
        &self,
        job: &mut Job,
        custom_words: &[String],
    ) -> PipelineResult<Vec<ProfanityMatch>> {
        if let Some(cache) = &job.profanity_matches {
            if cache.is_fresh(custom_words, self.config.profanity_cache_secs) {
                info!(job_id = %job.id, "Using cached profanity analysis");
                return Ok(cache.matches.clone());
            }
        }

        job.set_stage(Stage::Analyzing, 10);
        self.store.save(job).await;

        let retry = RetryConfig::new("analyze-audio");
        let source = job.current_source().to_path_buf();
        let matches = retry_rate_limited(&retry, || async {
            self.analyzer
                .analyze_audio(&source, custom_words)
                .await
                .map_err(Into::into)
        })
        .await?;

        job.profanity_matches = Some(ProfanityCache {
            matches: matches.clone(),
            custom_words: custom_words.to_vec(),
            captured_at: Utc::now(),
        });
        self.store.save(job).await;
        Ok(matches)
    }

    /// Blur or pixelate an object found by text prompt.
    pub async fn blur_object(&self, id: &JobId, params: BlurParams) -> PipelineResult<EditOutcome> {
        let lock = self.store.op_lock(id).await;
        let _guard = lock.lock().await;
        let mut job = self.store.get(id).await?;

        job.error = None;
        job.set_stage(Stage::Segmenting, 20);
        self.store.save(&job).await;

        match ops::blur::run(self, &job, &params).await {
            Ok(output) => {
                job.set_stage(Stage::Reconstructing, 90);
                self.store.save(&job).await;
                job.complete_with_output(output);
                self.store.save(&job).await;
                Ok(EditOutcome {
                    job_id: job.id.clone(),
                    download_path: download_route(&job.id),
                    message: format!("Applied {:?} to '{}'", params.effect, params.prompt),
                })
            }
            Err(e) => {
                job.fail(e.to_string());
                self.store.save(&job).await;
                Err(e)
            }
        }
    }

    /// Replace an object generatively, chunking long clips.
    pub async fn replace_generative(
        &self,
        id: &JobId,
        params: ReplaceParams,
    ) -> PipelineResult<EditOutcome> {
        let lock = self.store.op_lock(id).await;
        let _guard = lock.lock().await;
        let mut job = self.store.get(id).await?;

        job.error = None;
        job.set_stage(Stage::Editing, 20);
        self.store.save(&job).await;

        match ops::replace::run(self, &job, &params).await {
            Ok(output) => {
                job.set_stage(Stage::Reconstructing, 90);
                self.store.save(&job).await;
                job.complete_with_output(output);
                self.store.save(&job).await;
                Ok(EditOutcome {
                    job_id: job.id.clone(),
                    download_path: download_route(&job.id),
                    message: format!("Replaced content per '{}'", params.prompt),
                })
            }
            Err(e) => {
                job.fail(e.to_string());
                self.store.save(&job).await;
                Err(e)
            }
        }
    }

    /// Censor profanity with beep tones.
    pub async fn beep_audio(&self, id: &JobId, params: BeepParams) -> PipelineResult<CensorOutcome> {
        let lock = self.store.op_lock(id).await;
        let _guard = lock.lock().await;
        let mut job = self.store.get(id).await?;
        job.error = None;

        let result = async {
            let raw = self.matches_for(&mut job, &params.custom_words).await?;
            let merged = merge_adjacent(raw, self.config.merge_gap_seconds);

            job.set_stage(Stage::Editing, 40);
            self.store.save(&job).await;

            let output = ops::beep::run(self, &job, &merged).await?;
            Ok::<_, PipelineError>((merged, output))
        }
        .await;

        match result {
            Ok((matches, Some(output))) => {
                job.complete_with_output(output);
                self.store.save(&job).await;
                Ok(CensorOutcome {
                    job_id: job.id.clone(),
                    message: format!("Beeped {} segment(s)", matches.len()),
                    download_path: Some(download_route(&job.id)),
                    matches,
                })
            }
            Ok((matches, None)) => {
                job.set_stage(Stage::Completed, 100);
                self.store.save(&job).await;
                Ok(CensorOutcome {
                    job_id: job.id.clone(),
                    matches,
                    download_path: None,
                    message: "No profanity detected; video unchanged".to_string(),
                })
            }
            Err(e) => {
                job.fail(e.to_string());
                self.store.save(&job).await;
                Err(e)
            }
        }
    }

    /// Censor profanity by dubbing replacement speech.
    pub async fn dub_audio(&self, id: &JobId, params: DubParams) -> PipelineResult<CensorOutcome> {
        let lock = self.store.op_lock(id).await;
        let _guard = lock.lock().await;
        let mut job = self.store.get(id).await?;
        job.error = None;

        let result = async {
            let raw = self.matches_for(&mut job, &params.custom_words).await?;
            let merged = merge_adjacent(raw, self.config.merge_gap_seconds);

            job.set_stage(Stage::Editing, 40);
            self.store.save(&job).await;

            let output = ops::dub::run(self, &job, merged.clone(), &params).await?;
            Ok::<_, PipelineError>((merged, output))
        }
        .await;

        match result {
            Ok((matches, Some(output))) => {
                job.complete_with_output(output);
                self.store.save(&job).await;
                Ok(CensorOutcome {
                    job_id: job.id.clone(),
                    message: format!("Dubbed {} segment(s)", matches.len()),
                    download_path: Some(download_route(&job.id)),
                    matches,
                })
            }
            Ok((matches, None)) => {
                job.set_stage(Stage::Completed, 100);
                self.store.save(&job).await;
                Ok(CensorOutcome {
                    job_id: job.id.clone(),
                    matches,
                    download_path: None,
                    message: "No profanity detected; video unchanged".to_string(),
                })
            }
            Err(e) => {
                job.fail(e.to_string());
                self.store.save(&job).await;
                Err(e)
            }
        }
    }

    /// Suggest duration-matched clean alternatives for the given words.
    pub async fn suggest_replacements(
        &self,
        id: &JobId,
        words: &[String],
    ) -> PipelineResult<Vec<Suggestion>> {
        let job = self.store.get(id).await?;

        // Durations come from the cached analysis when available so
        // suggestions fit how the word was actually spoken.
        let durations: HashMap<String, f64> = job
            .profanity_matches
            .as_ref()
            .map(|cache| {
                cache
                    .matches
                    .iter()
                    .map(|m| (m.word.to_lowercase(), m.duration()))
                    .collect()
            })
            .unwrap_or_default();

        let mut suggestions = Vec::with_capacity(words.len());
        for word in words {
            let duration = durations.get(&word.to_lowercase()).copied().unwrap_or(0.5);
            let alternatives = self
                .analyzer
                .suggest_alternatives(word, duration, 5)
                .await?;
            suggestions.push(Suggestion {
                original: word.clone(),
                alternatives,
                duration,
            });
        }
        Ok(suggestions)
    }
}

/// Build the download route for a job.
fn download_route(id: &JobId) -> String {
    format!("/api/download/{}", id)
}

/// Pull a job id back out of a `.../jobs/{id}/...` URL.
fn parse_job_id_from_url(url: &str) -> Option<JobId> {
    let mut segments = url.split('/').skip_while(|s| *s != "jobs");
    segments.next()?; // "jobs"
    let id = segments.next()?;
    if id.len() >= 8 && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(JobId::from_string(id))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id_from_url() {
        let url = "https://storage.googleapis.com/bucket/jobs/abc12345/input.mp4";
        assert_eq!(
            parse_job_id_from_url(url),
            Some(JobId::from_string("abc12345"))
        );
        assert_eq!(parse_job_id_from_url("https://example.com/nope.mp4"), None);
        assert_eq!(
            parse_job_id_from_url("https://x/jobs/short/input.mp4"),
            None
        );
    }

    #[test]
    fn test_download_route() {
        assert_eq!(
            download_route(&JobId::from_string("abc12345")),
            "/api/download/abc12345"
        );
    }
}
