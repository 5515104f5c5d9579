//! Application state.

use std::sync::Arc;

use tracing::warn;

use recut_pipeline::{Pipeline, PipelineConfig};
use recut_storage::GcsClient;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Create new application state. The blob store is optional: without it
    /// the service still runs, minus restart recovery and generative edits.
    pub async fn new(config: ApiConfig) -> Self {
        let storage = match GcsClient::from_env().await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Blob storage unavailable, continuing local-only: {}", e);
                None
            }
        };

        let pipeline = Arc::new(Pipeline::new(PipelineConfig::from_env(), storage));

        Self { config, pipeline }
    }
}
