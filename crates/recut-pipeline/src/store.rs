//! Keyed registry of jobs with disk and blob-store recovery.
//!
//! The in-memory map is the fast path; the local job directory is the
//! authoritative artifact store; the blob store holds a JSON snapshot (and a
//! copy of the source) so a job survives process restarts and even the loss
//! of local disk. Recovery order on `get`: memory, local disk, blob.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use recut_models::{Job, JobId, JobSnapshot};
use recut_storage::GcsClient;

use crate::error::{PipelineError, PipelineResult};

const STATE_FILENAME: &str = "state.json";

/// Registry of in-progress and completed jobs.
pub struct JobStore {
    base_dir: PathBuf,
    storage: Option<Arc<GcsClient>>,
    jobs: RwLock<HashMap<JobId, Job>>,
    /// Per-job operation locks; serializes mutating operations per job id
    /// while leaving state reads (status polls) unblocked.
    op_locks: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl JobStore {
    /// Create a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, storage: Option<Arc<GcsClient>>) -> Self {
        Self {
            base_dir: base_dir.into(),
            storage,
            jobs: RwLock::new(HashMap::new()),
            op_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory holding all job directories.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The operation lock for a job. Held for the duration of a mutating
    /// operation; lives in the long-lived store so serialization spans
    /// HTTP requests.
    pub async fn op_lock(&self, id: &JobId) -> Arc<Mutex<()>> {
        let mut locks = self.op_locks.lock().await;
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    /// Create a new job from an uploaded source file.
    ///
    /// With `cleanup_prior` every previous job directory is deleted first;
    /// disk is the scarce resource, not job history.
    pub async fn create(&self, source: &Path, cleanup_prior: bool) -> PipelineResult<Job> {
        if cleanup_prior {
            self.cleanup_all().await?;
        }

        let id = JobId::new();
        let job_dir = self.base_dir.join(id.as_str());
        tokio::fs::create_dir_all(job_dir.join("frames")).await?;

        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_lowercase();
        let source_filename = format!("input.{}", extension);

        let mut job = Job::new(id.clone(), &job_dir, &source_filename);
        tokio::fs::copy(source, &job.source_video_path).await?;

        // Blob copy is best-effort; local disk stays authoritative.
        if let Some(storage) = &self.storage {
            let key = format!("jobs/{}/{}", id, source_filename);
            match storage
                .upload_file(&job.source_video_path, &key, "video/mp4")
                .await
            {
                Ok(()) => job.source_url = Some(storage.public_url(&key)),
                Err(e) => warn!("Source upload to blob store failed: {}", e),
            }
        }

        self.jobs.write().await.insert(id.clone(), job.clone());
        self.persist(&job).await;

        info!(job_id = %id, "Created job from {}", source.display());
        Ok(job)
    }

    /// Fetch a job, recovering from local disk or the blob store if the
    /// in-memory map does not have it (restart, eviction).
    pub async fn get(&self, id: &JobId) -> PipelineResult<Job> {
        if let Some(job) = self.jobs.read().await.get(id) {
            return Ok(job.clone());
        }

        if let Some(job) = self.recover_from_disk(id).await? {
            info!(job_id = %id, "Recovered job from local disk");
            self.jobs.write().await.insert(id.clone(), job.clone());
            return Ok(job);
        }

        if let Some(job) = self.recover_from_blob(id).await? {
            info!(job_id = %id, "Recovered job from blob store");
            self.jobs.write().await.insert(id.clone(), job.clone());
            return Ok(job);
        }

        Err(PipelineError::not_found(id.to_string()))
    }

    /// Force recovery of a job that is not in memory, e.g. after a restart
    /// triggered by a status poll. Same chain as `get`, but evicts any
    /// in-memory copy first so disk and blob state win.
    pub async fn restore(&self, id: &JobId) -> PipelineResult<Job> {
        self.jobs.write().await.remove(id);
        self.get(id).await
    }

    /// Write updated job state into the map.
    pub async fn update(&self, job: &Job) {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
    }

    /// Update the map and persist the snapshot (local state file always;
    /// blob store best-effort).
    pub async fn save(&self, job: &Job) {
        self.update(job).await;
        self.persist(job).await;
    }

    /// Persist the snapshot for restart recovery.
    pub async fn persist(&self, job: &Job) {
        let snapshot = job.snapshot();

        match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(job.job_dir.join(STATE_FILENAME), &bytes).await {
                    warn!(job_id = %job.id, "Failed to write local state file: {}", e);
                }
            }
            Err(e) => warn!(job_id = %job.id, "Failed to serialize job state: {}", e),
        }

        if let Some(storage) = &self.storage {
            let key = format!("jobs/{}/{}", job.id, STATE_FILENAME);
            if let Err(e) = storage.put_json(&key, &snapshot).await {
                warn!(job_id = %job.id, "Failed to persist state to blob store: {}", e);
            }
        }
    }

    /// Delete a job's local directory, map entry, and blob objects.
    pub async fn delete(&self, id: &JobId) -> PipelineResult<()> {
        let job_dir = self.base_dir.join(id.as_str());
        if job_dir.exists() {
            tokio::fs::remove_dir_all(&job_dir).await?;
        }
        self.jobs.write().await.remove(id);
        self.op_locks.lock().await.remove(id);

        if let Some(storage) = &self.storage {
            let prefix = format!("jobs/{}/", id);
            match storage.list_objects(&prefix).await {
                Ok(objects) => {
                    for obj in objects {
                        if let Err(e) = storage.delete_object(&obj.key).await {
                            warn!("Failed to delete blob {}: {}", obj.key, e);
                        }
                    }
                }
                Err(e) => warn!("Failed to list blobs for cleanup: {}", e),
            }
        }

        info!(job_id = %id, "Deleted job");
        Ok(())
    }

    /// List known job ids (in-memory view).
    pub async fn list(&self) -> Vec<JobId> {
        self.jobs.read().await.keys().cloned().collect()
    }

    /// Delete every job directory and clear the map.
    pub async fn cleanup_all(&self) -> PipelineResult<()> {
        if self.base_dir.exists() {
            let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    debug!("Removing prior job dir {}", path.display());
                    if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                        warn!("Failed to remove {}: {}", path.display(), e);
                    }
                }
            }
        }
        self.jobs.write().await.clear();
        self.op_locks.lock().await.clear();
        Ok(())
    }

    /// Reconstruct a job from its local directory: the persisted state file
    /// when present, else the bare files on disk.
    async fn recover_from_disk(&self, id: &JobId) -> PipelineResult<Option<Job>> {
        let job_dir = self.base_dir.join(id.as_str());
        if !job_dir.exists() {
            return Ok(None);
        }

        let state_path = job_dir.join(STATE_FILENAME);
        if state_path.exists() {
            match tokio::fs::read(&state_path).await {
                Ok(bytes) => match serde_json::from_slice::<JobSnapshot>(&bytes) {
                    Ok(snapshot) => {
                        let mut job = Job::from_snapshot(&job_dir, snapshot);
                        rediscover_frames(&mut job).await;
                        return Ok(Some(job));
                    }
                    Err(e) => warn!(job_id = %id, "Corrupt local state file: {}", e),
                },
                Err(e) => warn!(job_id = %id, "Unreadable local state file: {}", e),
            }
        }

        // No usable state file: rebuild from the files themselves.
        let source = find_input_file(&job_dir).await?;
        let Some(source) = source else {
            return Ok(None);
        };
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut job = Job::new(id.clone(), &job_dir, &filename);
        rediscover_frames(&mut job).await;
        Ok(Some(job))
    }

    /// Reconstruct a job from the blob-store snapshot, lazily re-downloading
    /// the source video when only the cloud copy survives.
    async fn recover_from_blob(&self, id: &JobId) -> PipelineResult<Option<Job>> {
        let Some(storage) = &self.storage else {
            return Ok(None);
        };

        let key = format!("jobs/{}/{}", id, STATE_FILENAME);
        let snapshot: Option<JobSnapshot> = storage.get_json(&key).await?;
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };

        let job_dir = self.base_dir.join(id.as_str());
        tokio::fs::create_dir_all(job_dir.join("frames")).await?;
        let mut job = Job::from_snapshot(&job_dir, snapshot);

        if !job.source_video_path.exists() {
            let source_key = format!(
                "jobs/{}/{}",
                id,
                job.source_video_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            );
            info!(job_id = %id, "Re-downloading source video from blob store");
            storage
                .download_file(&source_key, &job.source_video_path)
                .await?;
        }

        rediscover_frames(&mut job).await;
        Ok(Some(job))
    }
}

/// Frame paths must match what is actually on disk; a stale snapshot loses
/// to the filesystem.
async fn rediscover_frames(job: &mut Job) {
    let mut frames = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(&job.frames_dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_frame = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("frame_") && n.ends_with(".png"))
                .unwrap_or(false);
            if is_frame {
                frames.push(path);
            }
        }
    }
    frames.sort();
    job.frame_paths = frames;
}

async fn find_input_file(job_dir: &Path) -> PipelineResult<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(job_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_input = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s == "input")
            .unwrap_or(false);
        if is_input {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recut_models::Stage;

    async fn store_with_tmp() -> (tempfile::TempDir, JobStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = JobStore::new(tmp.path().join("jobs"), None);
        (tmp, store)
    }

    async fn fake_upload(dir: &Path) -> PathBuf {
        let path = dir.join("upload.mp4");
        tokio::fs::write(&path, b"not really a video").await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_create_copies_source_into_job_dir() {
        let (tmp, store) = store_with_tmp().await;
        let upload = fake_upload(tmp.path()).await;

        let job = store.create(&upload, true).await.unwrap();
        assert!(job.source_video_path.exists());
        assert!(job.source_video_path.ends_with("input.mp4"));
        assert_eq!(job.stage, Stage::Initialized);
    }

    #[tokio::test]
    async fn test_cleanup_prior_removes_old_jobs() {
        let (tmp, store) = store_with_tmp().await;
        let upload = fake_upload(tmp.path()).await;

        let first = store.create(&upload, true).await.unwrap();
        let second = store.create(&upload, true).await.unwrap();

        assert!(!first.job_dir.exists());
        assert!(second.job_dir.exists());
        assert!(store.get(&first.id).await.is_err());
    }

    #[tokio::test]
    async fn test_get_recovers_from_state_file_after_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("jobs");
        let upload = fake_upload(tmp.path()).await;

        let (id, expected) = {
            let store = JobStore::new(&base, None);
            let mut job = store.create(&upload, true).await.unwrap();
            job.complete_with_output(job.job_dir.join("edit1.mp4"));
            store.save(&job).await;
            (job.id.clone(), job.snapshot())
        };

        // Fresh store simulates a restart: empty map, same disk.
        let store = JobStore::new(&base, None);
        let recovered = store.get(&id).await.unwrap();
        assert_eq!(recovered.snapshot(), expected);
        assert_eq!(recovered.stage, Stage::Completed);
    }

    #[tokio::test]
    async fn test_get_recovers_bare_files_without_state() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("jobs");
        let id = JobId::from_string("cafe0123");
        let job_dir = base.join(id.as_str());
        tokio::fs::create_dir_all(job_dir.join("frames")).await.unwrap();
        tokio::fs::write(job_dir.join("input.mov"), b"x").await.unwrap();
        tokio::fs::write(job_dir.join("frames/frame_000001.png"), b"x")
            .await
            .unwrap();
        tokio::fs::write(job_dir.join("frames/frame_000002.png"), b"x")
            .await
            .unwrap();

        let store = JobStore::new(&base, None);
        let job = store.get(&id).await.unwrap();
        assert!(job.source_video_path.ends_with("input.mov"));
        assert_eq!(job.frame_paths.len(), 2);
        assert!(job.frame_paths[0].ends_with("frame_000001.png"));
    }

    #[tokio::test]
    async fn test_restore_prefers_persisted_state() {
        let (tmp, store) = store_with_tmp().await;
        let upload = fake_upload(tmp.path()).await;
        let mut job = store.create(&upload, true).await.unwrap();
        job.complete_with_output(job.job_dir.join("edit1.mp4"));
        store.save(&job).await;

        // Stale in-memory copy that never got persisted.
        let mut stale = job.clone();
        stale.error = Some("phantom".into());
        store.update(&stale).await;

        let restored = store.restore(&job.id).await.unwrap();
        assert_eq!(restored.error, None);
        assert_eq!(restored.stage, Stage::Completed);
    }

    #[tokio::test]
    async fn test_get_unknown_job_is_not_found() {
        let (_tmp, store) = store_with_tmp().await;
        let err = store.get(&JobId::from_string("00000000")).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_dir_and_entry() {
        let (tmp, store) = store_with_tmp().await;
        let upload = fake_upload(tmp.path()).await;

        let job = store.create(&upload, true).await.unwrap();
        store.delete(&job.id).await.unwrap();

        assert!(!job.job_dir.exists());
        assert!(store.get(&job.id).await.is_err());
    }

    #[tokio::test]
    async fn test_op_lock_is_stable_per_job() {
        let (_tmp, store) = store_with_tmp().await;
        let id = JobId::from_string("abcd1234");
        let a = store.op_lock(&id).await;
        let b = store.op_lock(&id).await;
        assert!(Arc::ptr_eq(&a, &b));
    }
}
