//! Pipeline error taxonomy.
//!
//! The HTTP layer maps these onto status codes: `Input` and
//! `MissingPrerequisite` are contract violations (400), `NotFound` is 404,
//! `RateLimited` survives retry exhaustion (503), `Timeout` is a polling
//! bound (504), everything else is a 500.

use thiserror::Error;

use recut_clients::ClientError;
use recut_media::MediaError;
use recut_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    MissingPrerequisite(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Rate limited by external service")]
    RateLimited,

    #[error("External service timed out after {0} seconds")]
    Timeout(u64),

    #[error("Cannot produce a URL for the backend: {0}")]
    Unsignable(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn missing_prerequisite(msg: impl Into<String>) -> Self {
        Self::MissingPrerequisite(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the operation should be retried with backoff.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PipelineError::RateLimited)
    }
}

impl From<ClientError> for PipelineError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::RateLimited => PipelineError::RateLimited,
            ClientError::Timeout(secs) => PipelineError::Timeout(secs),
            ClientError::InvalidInput(msg) => PipelineError::Input(msg),
            ClientError::Backend(msg) => PipelineError::Backend(msg),
            ClientError::Http(e) => PipelineError::Backend(e.to_string()),
            ClientError::Json(e) => PipelineError::Json(e),
            ClientError::Io(e) => PipelineError::Io(e),
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unsignable(msg) => PipelineError::Unsignable(msg),
            other => PipelineError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_mapping() {
        assert!(PipelineError::from(ClientError::RateLimited).is_rate_limited());
        assert!(matches!(
            PipelineError::from(ClientError::Timeout(300)),
            PipelineError::Timeout(300)
        ));
        assert!(matches!(
            PipelineError::from(ClientError::InvalidInput("bad".into())),
            PipelineError::Input(_)
        ));
    }

    #[test]
    fn test_storage_unsignable_mapping() {
        assert!(matches!(
            PipelineError::from(StorageError::Unsignable("too big".into())),
            PipelineError::Unsignable(_)
        ));
    }
}
