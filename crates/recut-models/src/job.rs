//! Job state and persisted snapshots.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::profanity::ProfanityMatch;
use crate::video::VideoInfo;

/// Unique identifier for a job. Short opaque id, 8 lowercase hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string()[..8].to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing stage of a job.
///
/// A job traverses `Segmenting -> Editing -> Reconstructing -> Completed`
/// repeatedly as edits are chained; `Failed` is terminal for the current
/// operation only and is cleared by the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Initialized,
    ExtractingFrames,
    Analyzing,
    Segmenting,
    Editing,
    Reconstructing,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initialized => "initialized",
            Stage::ExtractingFrames => "extracting_frames",
            Stage::Analyzing => "analyzing",
            Stage::Segmenting => "segmenting",
            Stage::Editing => "editing",
            Stage::Reconstructing => "reconstructing",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    /// Terminal for the current operation. The job itself survives and the
    /// next operation resumes from the last good output.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cached profanity analysis, kept on the job so beep/dub/suggest calls
/// within the cache window reuse a single analyzer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfanityCache {
    pub matches: Vec<ProfanityMatch>,
    /// Custom words the analysis was run with; a different set invalidates it.
    #[serde(default)]
    pub custom_words: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

impl ProfanityCache {
    /// Whether this cache entry is usable for a request with `custom_words`.
    pub fn is_fresh(&self, custom_words: &[String], max_age_secs: u64) -> bool {
        let mut ours = self.custom_words.clone();
        let mut theirs = custom_words.to_vec();
        ours.sort();
        theirs.sort();
        if ours != theirs {
            return false;
        }
        let age = Utc::now().signed_duration_since(self.captured_at);
        age.num_seconds() >= 0 && (age.num_seconds() as u64) <= max_age_secs
    }
}

/// In-memory state of a processing job.
///
/// A job exclusively owns the on-disk artifacts under its `job_dir`; the blob
/// store holds copies but they are not authoritative.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Local directory owning all job artifacts.
    pub job_dir: PathBuf,
    /// Original uploaded video on local disk.
    pub source_video_path: PathBuf,
    /// Canonical cloud URL of the source, if uploaded.
    pub source_url: Option<String>,
    /// Latest edited result; `None` until the first edit completes.
    pub output_path: Option<PathBuf>,
    pub frames_dir: PathBuf,
    /// Extracted audio track, if the source has one.
    pub audio_path: Option<PathBuf>,
    pub video_info: Option<VideoInfo>,
    /// Ordered frame files in `frames_dir` (empty until extraction runs).
    pub frame_paths: Vec<PathBuf>,
    pub stage: Stage,
    /// Progress percentage, 0-100.
    pub progress: u8,
    pub error: Option<String>,
    pub profanity_matches: Option<ProfanityCache>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a job rooted at `job_dir` with the conventional layout.
    pub fn new(id: JobId, job_dir: impl Into<PathBuf>, source_filename: &str) -> Self {
        let job_dir = job_dir.into();
        let now = Utc::now();
        Self {
            source_video_path: job_dir.join(source_filename),
            frames_dir: job_dir.join("frames"),
            id,
            job_dir,
            source_url: None,
            output_path: None,
            audio_path: None,
            video_info: None,
            frame_paths: Vec::new(),
            stage: Stage::Initialized,
            progress: 0,
            error: None,
            profanity_matches: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The video the next operation consumes: the latest output if one
    /// exists, else the original source (chaining).
    pub fn current_source(&self) -> &Path {
        self.output_path
            .as_deref()
            .unwrap_or(&self.source_video_path)
    }

    /// Move to a stage, updating progress.
    pub fn set_stage(&mut self, stage: Stage, progress: u8) {
        self.stage = stage;
        self.progress = progress.min(100);
        self.updated_at = Utc::now();
    }

    /// Record a new successful edit output.
    pub fn complete_with_output(&mut self, output: PathBuf) {
        self.output_path = Some(output);
        self.error = None;
        self.set_stage(Stage::Completed, 100);
    }

    /// Mark the current operation failed. `output_path` stays untouched so
    /// the last successful edit remains downloadable.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.set_stage(Stage::Failed, self.progress);
    }

    /// Serializable snapshot for blob persistence. Stores filenames only;
    /// `from_snapshot` rebuilds absolute paths against the local job dir.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            stage: self.stage,
            progress: self.progress,
            video_info: self.video_info.clone(),
            source_url: self.source_url.clone(),
            source_filename: file_name(&self.source_video_path),
            output_filename: self.output_path.as_deref().map(|p| file_name(p)),
            audio_filename: self.audio_path.as_deref().map(|p| file_name(p)),
            frame_filenames: self.frame_paths.iter().map(|p| file_name(p)).collect(),
            error: self.error.clone(),
            profanity_matches: self.profanity_matches.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Rebuild a job from a persisted snapshot and a local job directory.
    pub fn from_snapshot(job_dir: impl Into<PathBuf>, snap: JobSnapshot) -> Self {
        let job_dir = job_dir.into();
        let frames_dir = job_dir.join("frames");
        Self {
            id: snap.job_id,
            source_video_path: job_dir.join(&snap.source_filename),
            source_url: snap.source_url,
            output_path: snap.output_filename.map(|f| job_dir.join(f)),
            audio_path: snap.audio_filename.map(|f| job_dir.join(f)),
            frame_paths: snap
                .frame_filenames
                .iter()
                .map(|f| frames_dir.join(f))
                .collect(),
            frames_dir,
            job_dir,
            video_info: snap.video_info,
            stage: snap.stage,
            progress: snap.progress,
            error: snap.error,
            profanity_matches: snap.profanity_matches,
            created_at: snap.created_at,
            updated_at: snap.updated_at,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Persisted form of a job (`jobs/{id}/state.json` in the blob store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub stage: Stage,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_info: Option<VideoInfo>,
    #[serde(rename = "sourceURL", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub source_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_filename: Option<String>,
    #[serde(default)]
    pub frame_filenames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profanity_matches: Option<ProfanityCache>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_format() {
        let id = JobId::new();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_stage_wire_names() {
        assert_eq!(Stage::ExtractingFrames.as_str(), "extracting_frames");
        assert_eq!(
            serde_json::to_string(&Stage::Reconstructing).unwrap(),
            "\"reconstructing\""
        );
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Completed.is_terminal());
    }

    #[test]
    fn test_chaining_source_selection() {
        let mut job = Job::new(JobId::new(), "/data/jobs/abc12345", "input.mp4");
        assert!(job.current_source().ends_with("input.mp4"));

        job.complete_with_output(job.job_dir.join("blurred.mp4"));
        assert!(job.current_source().ends_with("blurred.mp4"));
        assert_eq!(job.stage, Stage::Completed);
    }

    #[test]
    fn test_fail_preserves_output() {
        let mut job = Job::new(JobId::new(), "/data/jobs/abc12345", "input.mp4");
        job.complete_with_output(job.job_dir.join("edit1.mp4"));

        job.fail("segmentation backend down");
        assert_eq!(job.stage, Stage::Failed);
        assert!(job.output_path.as_ref().unwrap().ends_with("edit1.mp4"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut job = Job::new(JobId::from_string("deadbeef"), "/data/jobs/deadbeef", "input.mov");
        job.source_url = Some("https://storage.googleapis.com/b/jobs/deadbeef/input.mov".into());
        job.output_path = Some(job.job_dir.join("pixelated.mp4"));
        job.audio_path = Some(job.job_dir.join("audio.aac"));
        job.frame_paths = vec![
            job.frames_dir.join("frame_000001.png"),
            job.frames_dir.join("frame_000002.png"),
        ];
        job.set_stage(Stage::Completed, 100);

        let snap = job.snapshot();
        // Filenames only, never absolute paths.
        assert_eq!(snap.source_filename, "input.mov");
        assert_eq!(snap.output_filename.as_deref(), Some("pixelated.mp4"));
        assert_eq!(snap.frame_filenames[1], "frame_000002.png");

        // Restore under a different local root (deployment moved).
        let restored = Job::from_snapshot("/mnt/other/deadbeef", snap.clone());
        assert_eq!(restored.snapshot(), snap);
        assert!(restored.source_video_path.starts_with("/mnt/other/deadbeef"));
        assert!(restored.frame_paths[0].starts_with("/mnt/other/deadbeef/frames"));
    }

    #[test]
    fn test_profanity_cache_freshness() {
        let cache = ProfanityCache {
            matches: vec![],
            custom_words: vec!["frick".into()],
            captured_at: Utc::now(),
        };
        assert!(cache.is_fresh(&["frick".into()], 600));
        assert!(!cache.is_fresh(&[], 600));
        assert!(!cache.is_fresh(&["frick".into(), "heck".into()], 600));

        let stale = ProfanityCache {
            captured_at: Utc::now() - chrono::Duration::seconds(700),
            ..cache
        };
        assert!(!stale.is_fresh(&["frick".into()], 600));
    }
}
