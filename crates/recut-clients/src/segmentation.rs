//! Text-prompted video segmentation client.
//!
//! Prediction-style API: create a prediction, poll until it settles. The
//! returned mask video is frame-aligned to the input; with `mask_only` the
//! output luma is strictly binary (white = target region).

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::{download_to, VideoSource};
use crate::error::{ClientError, ClientResult};

const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
const POLL_INTERVAL_SECS: u64 = 2;
const MAX_WAIT_SECS: u64 = 300;

/// Client for the hosted segmentation model.
pub struct SegmentationClient {
    http: Client,
    api_token: String,
    base_url: String,
    model_version: String,
}

/// Result of a segmentation run.
#[derive(Debug, Clone)]
pub struct SegmentationOutput {
    /// URL of the generated mask video.
    pub mask_video_url: String,
    /// Whether the output is a bare binary mask (vs. a colored overlay).
    pub mask_only: bool,
}

#[derive(Debug, Serialize)]
struct PredictionRequest {
    version: String,
    input: PredictionInput,
}

#[derive(Debug, Serialize)]
struct PredictionInput {
    video: String,
    prompt: String,
    mask_only: bool,
    mask_color: String,
    mask_opacity: f64,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl SegmentationClient {
    /// Create a client from an API token.
    pub fn new(api_token: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_version: model_version.into(),
        }
    }

    /// Override the API base URL (tests, self-hosted gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Generate a mask video for `prompt` over the given source.
    ///
    /// Accepts a public URL or a local file (shipped inline). The mask is
    /// frame-aligned to the input.
    pub async fn segment(
        &self,
        video: VideoSource,
        prompt: &str,
        mask_only: bool,
        overlay_color: &str,
        overlay_opacity: f64,
    ) -> ClientResult<SegmentationOutput> {
        let video_uri = video.into_uri().await?;
        info!("Segmenting with prompt '{}' (mask_only={})", prompt, mask_only);

        let request = PredictionRequest {
            version: self.model_version.clone(),
            input: PredictionInput {
                video: video_uri,
                prompt: prompt.to_string(),
                mask_only,
                mask_color: overlay_color.to_string(),
                mask_opacity: overlay_opacity,
            },
        };

        let response = self
            .http
            .post(format!("{}/v1/predictions", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, body));
        }

        let prediction: Prediction = response.json().await?;
        let settled = self.poll(&prediction.id).await?;

        let mask_video_url = settled
            .output
            .as_ref()
            .and_then(output_url)
            .ok_or_else(|| ClientError::backend("No output URL in settled prediction"))?;

        Ok(SegmentationOutput {
            mask_video_url,
            mask_only,
        })
    }

    /// Poll a prediction until it settles, bounded by `MAX_WAIT_SECS`.
    async fn poll(&self, id: &str) -> ClientResult<Prediction> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(MAX_WAIT_SECS);

        loop {
            let response = self
                .http
                .get(format!("{}/v1/predictions/{}", self.base_url, id))
                .bearer_auth(&self.api_token)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ClientError::from_status(status, body));
            }

            let prediction: Prediction = response.json().await?;
            debug!("Prediction {} status: {}", id, prediction.status);

            match prediction.status.as_str() {
                "succeeded" => return Ok(prediction),
                "failed" | "canceled" => {
                    return Err(ClientError::backend(
                        prediction
                            .error
                            .unwrap_or_else(|| "Prediction failed".to_string()),
                    ))
                }
                _ => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::Timeout(MAX_WAIT_SECS));
            }
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
    }

    /// Download a settled mask video.
    pub async fn download_result(&self, url: &str, output: &Path) -> ClientResult<PathBuf> {
        download_to(&self.http, url, output).await
    }
}

/// Predictions return either a bare URL or a list of URLs.
fn output_url(output: &serde_json::Value) -> Option<String> {
    match output {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items.first().and_then(|v| v.as_str()).map(String::from),
        serde_json::Value::Object(map) => map
            .get("video")
            .or_else(|| map.get("output"))
            .and_then(|v| v.as_str())
            .map(String::from),
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
    fn test_output_url_shapes() {
        assert_eq!(
            output_url(&json!("https://x/mask.mp4")).as_deref(),
            Some("https://x/mask.mp4")
        );
        assert_eq!(
            output_url(&json!(["https://x/a.mp4", "https://x/b.mp4"])).as_deref(),
            Some("https://x/a.mp4")
        );
        assert_eq!(
            output_url(&json!({"video": "https://x/v.mp4"})).as_deref(),
            Some("https://x/v.mp4")
        );
        assert_eq!(output_url(&json!(42)), None);
    }

    #[tokio::test]
    async fn test_segment_polls_to_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "pred1",
                "status": "starting"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/predictions/pred1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pred1",
                "status": "succeeded",
                "output": "https://cdn.example/mask.mp4"
            })))
            .mount(&server)
            .await;

        let client = SegmentationClient::new("token", "v1").with_base_url(server.uri());
        let result = client
            .segment(
                VideoSource::Url("https://example.com/in.mp4".into()),
                "cigarette",
                true,
                "green",
                0.5,
            )
            .await
            .unwrap();

        assert_eq!(result.mask_video_url, "https://cdn.example/mask.mp4");
        assert!(result.mask_only);
    }

    #[tokio::test]
    async fn test_segment_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = SegmentationClient::new("token", "v1").with_base_url(server.uri());
        let err = client
            .segment(
                VideoSource::Url("https://example.com/in.mp4".into()),
                "logo",
                true,
                "green",
                0.5,
            )
            .await
            .unwrap_err();

        assert!(err.is_rate_limited());
    }
}
