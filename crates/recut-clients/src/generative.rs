//! Generative video-edit client.
//!
//! Task-style API: create a video-to-video task, poll until it settles.
//! Inputs must be publicly reachable URLs (or data URIs); the backend will
//! not fetch private storage. Some backends reject clips beyond ~10 s; the
//! orchestrator slices and stitches, this client edits what it is given.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::download_to;
use crate::error::{ClientError, ClientResult};

const DEFAULT_BASE_URL: &str = "https://api.dev.runwayml.com/v1";
const API_VERSION: &str = "2024-11-06";
const POLL_INTERVAL_SECS: u64 = 5;
const MAX_WAIT_SECS: u64 = 300;

/// Client for the generative video-edit backend.
pub struct GenerativeEditClient {
    http: Client,
    api_key: String,
    base_url: String,
}

/// A single edit request.
#[derive(Debug, Clone)]
pub struct EditRequest {
    /// Public URL of the source clip.
    pub video_url: String,
    /// Edit instruction.
    pub prompt: String,
    /// Optional mask video URL constraining the edit region.
    pub mask_video_url: Option<String>,
    /// Optional reference image URI used as the first-frame anchor, so the
    /// replacement object keeps its identity across chunk calls.
    pub reference_image_url: Option<String>,
    /// Requested output duration in whole seconds.
    pub seconds: u32,
    /// Aspect ratio, e.g. "16:9".
    pub aspect_ratio: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskRequest {
    video_uri: String,
    prompt_text: String,
    model: String,
    ratio: String,
    seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt_image: Option<PromptImage>,
}

#[derive(Debug, Serialize)]
struct PromptImage {
    uri: String,
    position: String,
}

#[derive(Debug, Deserialize)]
struct TaskCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Task {
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl GenerativeEditClient {
    /// Create a client from an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (tests, self-hosted gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run a video edit and return the output video URL.
    pub async fn edit(&self, request: EditRequest) -> ClientResult<String> {
        info!(
            "Generative edit: '{}' ({}s, ratio {})",
            request.prompt, request.seconds, request.aspect_ratio
        );

        let payload = TaskRequest {
            video_uri: request.video_url,
            prompt_text: request.prompt,
            model: "gen4_aleph".to_string(),
            ratio: map_ratio(&request.aspect_ratio).to_string(),
            seconds: request.seconds,
            mask_uri: request.mask_video_url,
            prompt_image: request.reference_image_url.map(|uri| PromptImage {
                uri,
                position: "first".to_string(),
            }),
        };

        let response = self
            .http
            .post(format!("{}/video_to_video", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Runway-Version", API_VERSION)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, body));
        }

        let created: TaskCreated = response.json().await?;
        self.poll(&created.id).await
    }

    /// Poll a task until SUCCEEDED/FAILED, bounded at five minutes total.
    async fn poll(&self, task_id: &str) -> ClientResult<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(MAX_WAIT_SECS);

        loop {
            let response = self
                .http
                .get(format!("{}/tasks/{}", self.base_url, task_id))
                .bearer_auth(&self.api_key)
                .header("X-Runway-Version", API_VERSION)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ClientError::from_status(status, body));
            }

            let task: Task = response.json().await?;
            debug!("Task {} status: {}", task_id, task.status);

            match task.status.as_str() {
                "SUCCEEDED" => {
                    return task
                        .output
                        .as_ref()
                        .and_then(output_url)
                        .ok_or_else(|| ClientError::backend("No output URL in completed task"));
                }
                "FAILED" => {
                    return Err(ClientError::backend(
                        task.error.unwrap_or_else(|| "Task failed".to_string()),
                    ));
                }
                _ => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::Timeout(MAX_WAIT_SECS));
            }
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
    }

    /// Download a completed edit.
    pub async fn download_result(&self, url: &str, output: &Path) -> ClientResult<PathBuf> {
        download_to(&self.http, url, output).await
    }
}

/// Map a display aspect ratio to the backend's pixel-dimension format.
fn map_ratio(aspect: &str) -> &'static str {
    match aspect {
        "9:16" => "720:1280",
        "1:1" => "1024:1024",
        "4:3" => "1024:768",
        _ => "1280:720",
    }
}

fn output_url(output: &serde_json::Value) -> Option<String> {
    match output {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items.first().and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_map_ratio() {
        assert_eq!(map_ratio("16:9"), "1280:720");
        assert_eq!(map_ratio("9:16"), "720:1280");
        assert_eq!(map_ratio("weird"), "1280:720");
    }

    fn request() -> EditRequest {
        EditRequest {
            video_url: "https://example.com/chunk.mp4".into(),
            prompt: "replace the beer bottle with a soda can".into(),
            mask_video_url: None,
            reference_image_url: Some("https://example.com/ref.png".into()),
            seconds: 5,
            aspect_ratio: "16:9".into(),
        }
    }

    #[tokio::test]
    async fn test_edit_polls_to_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/video_to_video"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "task1"})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/tasks/task1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "SUCCEEDED",
                "output": ["https://cdn.example/edited.mp4"]
            })))
            .mount(&server)
            .await;

        let client = GenerativeEditClient::new("key").with_base_url(server.uri());
        let url = client.edit(request()).await.unwrap();
        assert_eq!(url, "https://cdn.example/edited.mp4");
    }

    #[tokio::test]
    async fn test_edit_failure_surfaces_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/video_to_video"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "task2"})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/tasks/task2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "FAILED",
                "error": "content policy"
            })))
            .mount(&server)
            .await;

        let client = GenerativeEditClient::new("key").with_base_url(server.uri());
        let err = client.edit(request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Backend(msg) if msg.contains("content policy")));
    }
}
