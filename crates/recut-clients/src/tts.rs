//! Text-to-speech client with voice cloning.

use std::path::{Path, PathBuf};

use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const TTS_MODEL: &str = "eleven_multilingual_v2";

/// Preset voice ids for the male/female voices, configuration-provided.
#[derive(Debug, Clone)]
pub struct VoicePresets {
    pub male: String,
    pub female: String,
}

impl Default for VoicePresets {
    fn default() -> Self {
        Self {
            male: "pNInz6obpgDQGcFmaJgB".to_string(),
            female: "21m00Tcm4TlvDq8ikWAM".to_string(),
        }
    }
}

impl VoicePresets {
    /// Resolve a preset name; unknown names fall back to the female voice.
    pub fn resolve(&self, name: &str) -> &str {
        match name {
            "male" => &self.male,
            _ => &self.female,
        }
    }
}

/// Client for the TTS backend.
pub struct TtsClient {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct VoiceCreated {
    voice_id: String,
}

impl TtsClient {
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

    /// Synthesize speech to an audio file.
    pub async fn speak(&self, text: &str, voice_id: &str, output: &Path) -> ClientResult<PathBuf> {
        debug!("Generating speech with voice {}: '{}'", voice_id, text);

        let response = self
            .http
            .post(format!("{}/v1/text-to-speech/{}", self.base_url, voice_id))
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": TTS_MODEL,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, body));
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(output, &bytes).await?;

        debug!("Speech written to {}", output.display());
        Ok(output.to_path_buf())
    }

    /// Clone a voice from an audio sample. The returned id is a shared cloud
    /// resource; callers must delete it when done or provider quota leaks.
    pub async fn clone_voice(&self, sample: &Path, name: &str) -> ClientResult<String> {
        info!("Cloning voice '{}' from {}", name, sample.display());

        let bytes = tokio::fs::read(sample).await?;
        let file_name = sample
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample.mp3".to_string());

        let form = multipart::Form::new().text("name", name.to_string()).part(
            "files",
            multipart::Part::bytes(bytes)
                .file_name(file_name)
                .mime_str("audio/mpeg")
                .map_err(|e| ClientError::invalid_input(e.to_string()))?,
        );

        let response = self
            .http
            .post(format!("{}/v1/voices/add", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, body));
        }

        let created: VoiceCreated = response.json().await?;
        info!("Voice cloned: {}", created.voice_id);
        Ok(created.voice_id)
    }

    /// Delete a cloned voice.
    pub async fn delete_voice(&self, voice_id: &str) -> ClientResult<()> {
        let response = self
            .http
            .delete(format!("{}/v1/voices/{}", self.base_url, voice_id))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, body));
        }

        info!("Deleted cloned voice {}", voice_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_preset_resolution() {
        let presets = VoicePresets::default();
        assert_eq!(presets.resolve("male"), presets.male);
        assert_eq!(presets.resolve("female"), presets.female);
        assert_eq!(presets.resolve("unknown"), presets.female);
    }

    #[tokio::test]
    async fn test_speak_writes_audio() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-mp3".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dub.mp3");

        let client = TtsClient::new("key").with_base_url(server.uri());
        client.speak("darn it", "voice1", &out).await.unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"fake-mp3");
    }

    #[tokio::test]
    async fn test_clone_and_delete_voice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/voices/add"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"voice_id": "v42"})))
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/v1/voices/v42"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("sample.mp3");
        std::fs::write(&sample, b"sample-audio").unwrap();

        let client = TtsClient::new("key").with_base_url(server.uri());
        let voice_id = client.clone_voice(&sample, "job-clone").await.unwrap();
        assert_eq!(voice_id, "v42");
        client.delete_voice(&voice_id).await.unwrap();
    }
}
