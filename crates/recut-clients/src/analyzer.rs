//! LLM analyzer client.
//!
//! One client, four capabilities: full-video compliance analysis, profanity
//! timing detection, frame-region identification, and the two small text
//! tasks (replacement suggestions, prompt simplification). Media files are
//! uploaded to the model's file API first, then referenced from a
//! generateContent call; text-only tasks skip the upload.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use recut_models::{BoundingBox, ProfanityMatch, RegionAnalysis, VideoAnalysis};

use crate::common::{guess_mime, strip_code_fences};
use crate::error::{ClientError, ClientResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const UPLOAD_POLL_INTERVAL_SECS: u64 = 1;
const UPLOAD_MAX_WAIT_SECS: u64 = 120;

const VIDEO_ANALYSIS_PROMPT: &str = r#"You are a video compliance analyzer. Analyze this video to identify content that may require moderation or editing for platform compliance.

Identify and report any instances of:
1. Alcohol/Substances: beer, wine, liquor, cigarettes, vaping, drugs
2. Brand logos: unauthorized brand exposure, product placements
3. Violence: fighting, weapons, aggressive behavior
4. Language: profanity, hate speech, explicit content
5. Other: sensitive content, copyright issues, inappropriate gestures

Instructions:
- Focus on ACTIONS not just object presence
- Track WHEN violations occur with precise timestamps
- Estimate bounding box positions (top/left/width/height as percentages 0-100)
- Assign severity: "critical" for major violations, "warning" for minor ones
- Suggest a remediation action per finding (blur, pixelate, mute, replace)
- Sort findings by startTime, earliest first

Return ONLY a JSON object with this shape:
{
  "findings": [
    {
      "category": "alcohol|logo|violence|language|other",
      "content": "what was detected",
      "startTime": 0.0,
      "endTime": 0.0,
      "status": "warning|critical",
      "confidence": "Low|Medium|High",
      "box": {"top": 0, "left": 0, "width": 0, "height": 0},
      "suggestedAction": "recommended remediation"
    }
  ],
  "summary": "overall summary",
  "riskLevel": "Low|Moderate|High|Critical",
  "predictedAgeRating": "U|12+|18+"
}

If no compliance issues are found, return an empty findings array with an appropriate summary."#;

/// Client for the LLM analysis backend.
pub struct AnalyzerClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "fileData", skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

#[derive(Debug, Serialize)]
struct FileData {
    #[serde(rename = "fileUri")]
    file_uri: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    name: String,
    uri: String,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    state: String,
}

impl AnalyzerClient {
    /// Create a client from an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Override the API base URL (tests, self-hosted gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Analyze a full video for compliance findings.
    pub async fn analyze_video(&self, video: &Path) -> ClientResult<VideoAnalysis> {
        info!("Analyzing video for compliance: {}", video.display());
        let file = self.upload_media(video).await?;
        let text = self
            .generate(VIDEO_ANALYSIS_PROMPT, Some(&file))
            .await?;

        let mut analysis: VideoAnalysis = serde_json::from_str(strip_code_fences(&text))?;
        analysis.sort_findings();
        info!("Analysis produced {} findings", analysis.findings.len());
        Ok(analysis)
    }

    /// Detect profanity (and any custom words) with timestamps.
    ///
    /// Matches come back ordered by start time. Entries with an empty window
    /// are dropped; the orchestrator still runs its own merge pass.
    pub async fn analyze_audio(
        &self,
        video: &Path,
        custom_words: &[String],
    ) -> ClientResult<Vec<ProfanityMatch>> {
        info!("Analyzing audio for profanity: {}", video.display());

        let custom_instruction = if custom_words.is_empty() {
            String::new()
        } else {
            format!("\nAlso detect these custom words: {}", custom_words.join(", "))
        };

        let prompt = format!(
            r#"Analyze this video's audio track and detect ALL instances of profanity, cuss words, and inappropriate language.
{custom}

For EACH profane word or phrase detected provide the exact word spoken, start and end timestamps in seconds (precise to 0.1s), a clean contextually appropriate replacement, your confidence, brief context, and a stable speaker label ("speaker_1", "speaker_2", ...) for who said it.

Return ONLY a JSON array:
[
  {{
    "word": "profane word",
    "startTime": 12.5,
    "endTime": 13.2,
    "replacement": "clean alternative",
    "confidence": "High",
    "context": "what was being said",
    "speakerId": "speaker_1"
  }}
]

If NO profanity is detected, return an empty array: []
Be thorough and check the entire audio track, ordered by startTime."#,
            custom = custom_instruction
        );

        let file = self.upload_media(video).await?;
        let text = self.generate(&prompt, Some(&file)).await?;

        let items: Vec<serde_json::Value> = serde_json::from_str(strip_code_fences(&text))?;
        let mut matches: Vec<ProfanityMatch> = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<ProfanityMatch>(item.clone()) {
                Ok(m) if m.end_time > m.start_time => matches.push(m),
                Ok(m) => warn!("Dropping empty-window match for '{}'", m.word),
                Err(e) => warn!("Skipping invalid profanity match {}: {}", item, e),
            }
        }
        matches.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        info!("Detected {} profanity instances", matches.len());
        Ok(matches)
    }

    /// Identify what sits inside a user-drawn region of a frame.
    pub async fn analyze_region(
        &self,
        frame: &Path,
        box_: &BoundingBox,
    ) -> ClientResult<RegionAnalysis> {
        let prompt = format!(
            r#"Look at the region of this image at left {left:.1}%, top {top:.1}%, spanning {width:.1}% x {height:.1}% of the frame.

Identify the most prominent object in that region and whether it raises a platform-compliance concern.

Return ONLY a JSON object:
{{
  "itemName": "concrete object name",
  "reasoning": "why it matters for compliance, one or two sentences",
  "confidence": "Low|Medium|High",
  "suggestedActions": ["blur", "pixelate", "replace"]
}}"#,
            left = box_.left,
            top = box_.top,
            width = box_.width,
            height = box_.height,
        );

        let file = self.upload_media(frame).await?;
        let text = self.generate(&prompt, Some(&file)).await?;
        Ok(serde_json::from_str(strip_code_fences(&text))?)
    }

    /// Suggest clean alternatives for a word that fit its speaking duration.
    ///
    /// Falls back to a small hardcoded table when the backend fails, so the
    /// suggestion endpoint degrades instead of erroring.
    pub async fn suggest_alternatives(
        &self,
        word: &str,
        duration: f64,
        count: usize,
    ) -> ClientResult<Vec<String>> {
        let syllables = estimate_syllables(duration);
        let prompt = format!(
            r#"Generate {count} alternative words or short phrases to replace the word "{word}".

Requirements:
1. Contextually appropriate and clean/family-friendly
2. Approximately {syllables} syllable(s) to match a speaking duration of {duration:.2} seconds
3. Natural when spoken, never profane
4. Prefer common, easy-to-pronounce words

Return ONLY a JSON array of {count} strings."#,
        );

        match self.generate(&prompt, None).await {
            Ok(text) => {
                let suggestions: Vec<String> = serde_json::from_str(strip_code_fences(&text))
                    .unwrap_or_else(|_| fallback_suggestions(word));
                Ok(suggestions.into_iter().take(count).collect())
            }
            Err(e) => {
                warn!("Suggestion backend failed for '{}': {}", word, e);
                Ok(fallback_suggestions(word).into_iter().take(count).collect())
            }
        }
    }

    /// Distill a compliance description into a concrete noun the
    /// segmentation model can find ("Depiction of tobacco use" -> "cigarette").
    ///
    /// Falls back to the input on failure so segmentation still runs.
    pub async fn simplify_prompt(&self, complex: &str) -> ClientResult<String> {
        let prompt = format!(
            r#"Extract ONLY the concrete, visible physical objects from this description, as simple common nouns, comma-separated, at most 3-5 words. No actions, concepts, or abstract ideas.

Examples:
"Depiction of tobacco use" -> "cigarette"
"Character is seen with a cigarette in mouth and subsequently lighting it" -> "cigarette"
"Large scale building explosion in the background" -> "building, explosion"
"Graphic shooting with blood and violence" -> "gun, blood"

Description: "{complex}"
Return only the nouns, nothing else."#,
        );

        match self.generate(&prompt, None).await {
            Ok(text) => {
                let simplified = text.trim().trim_matches('"').trim().to_string();
                if simplified.is_empty() {
                    return Ok(complex.to_string());
                }
                debug!("Prompt simplified: '{}' -> '{}'", complex, simplified);
                Ok(simplified)
            }
            Err(e) => {
                warn!("Prompt simplification failed, using original: {}", e);
                Ok(complex.to_string())
            }
        }
    }

    /// Upload a media file and wait for it to become usable.
    async fn upload_media(&self, path: &Path) -> ClientResult<UploadedFile> {
        let bytes = tokio::fs::read(path).await?;
        let mime = guess_mime(path);
        debug!("Uploading {} ({} bytes) to analyzer", path.display(), bytes.len());

        let response = self
            .http
            .post(format!(
                "{}/upload/v1beta/files?key={}",
                self.base_url, self.api_key
            ))
            .header("Content-Type", mime)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, body));
        }

        let mut uploaded: UploadResponse = response.json().await?;
        if uploaded.file.mime_type.is_empty() {
            uploaded.file.mime_type = mime.to_string();
        }
        self.wait_for_file(uploaded.file).await
    }

    /// Poll an uploaded file until it leaves PROCESSING.
    async fn wait_for_file(&self, mut file: UploadedFile) -> ClientResult<UploadedFile> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(UPLOAD_MAX_WAIT_SECS);
        let mime = file.mime_type.clone();

        while file.state == "PROCESSING" {
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::Timeout(UPLOAD_MAX_WAIT_SECS));
            }
            tokio::time::sleep(Duration::from_secs(UPLOAD_POLL_INTERVAL_SECS)).await;

            let response = self
                .http
                .get(format!("{}/v1beta/{}?key={}", self.base_url, file.name, self.api_key))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ClientError::from_status(status, body));
            }
            file = response.json().await?;
            if file.mime_type.is_empty() {
                file.mime_type = mime.clone();
            }
        }

        if file.state == "FAILED" {
            return Err(ClientError::backend("Media upload processing failed"));
        }
        Ok(file)
    }

    /// Run a generateContent call and return the first candidate's text.
    async fn generate(&self, prompt: &str, file: Option<&UploadedFile>) -> ClientResult<String> {
        let mut parts = Vec::with_capacity(2);
        if let Some(file) = file {
            parts.push(Part {
                text: None,
                file_data: Some(FileData {
                    file_uri: file.uri.clone(),
                    mime_type: file.mime_type.clone(),
                }),
            });
        }
        parts.push(Part {
            text: Some(prompt.to_string()),
            file_data: None,
        });

        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.1,
            },
        };

        let response = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            ))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, body));
        }

        let generated: GenerateResponse = response.json().await?;
        generated
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| ClientError::backend("No content in analyzer response"))
    }
}

/// Rough syllable count from speaking duration (~0.25 s per syllable).
fn estimate_syllables(duration: f64) -> usize {
    ((duration / 0.25).round() as usize).max(1)
}

/// Hardcoded alternatives used when the suggestion backend is unavailable.
fn fallback_suggestions(word: &str) -> Vec<String> {
    let table: &[(&str, &[&str])] = &[
        ("damn", &["darn", "dang", "drat", "shoot", "blast"]),
        ("shit", &["shoot", "sugar", "shucks", "crud", "crap"]),
        ("hell", &["heck", "hades", "heavens", "hay", "whoa"]),
        ("fuck", &["frick", "freak", "flip", "fudge", "forget"]),
        ("ass", &["butt", "rear", "behind", "backside", "donkey"]),
        ("bitch", &["witch", "jerk", "meanie", "grump", "pain"]),
        ("crap", &["crud", "junk", "trash", "stuff", "nonsense"]),
        ("piss", &["tick", "upset", "annoy", "anger", "bother"]),
    ];

    table
        .iter()
        .find(|(w, _)| *w == word.to_lowercase())
        .map(|(_, alts)| alts.iter().map(|s| s.to_string()).collect())
        .unwrap_or_else(|| {
            vec![
                "alternative".to_string(),
                "replacement".to_string(),
                "substitute".to_string(),
            ]
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_estimate_syllables() {
        assert_eq!(estimate_syllables(0.2), 1);
        assert_eq!(estimate_syllables(0.5), 2);
        assert_eq!(estimate_syllables(1.0), 4);
    }

    #[test]
    fn test_fallback_suggestions_known_word() {
        let alts = fallback_suggestions("Damn");
        assert_eq!(alts[0], "darn");
        assert_eq!(alts.len(), 5);
    }

    #[test]
    fn test_fallback_suggestions_unknown_word() {
        let alts = fallback_suggestions("zorp");
        assert_eq!(alts[0], "alternative");
    }

    #[test]
    fn test_profanity_match_parses_wire_format() {
        let raw = json!({
            "word": "damn",
            "startTime": 1.2,
            "endTime": 1.5,
            "replacement": "darn",
            "confidence": "high",
            "context": "frustration",
            "speakerId": "speaker_1"
        });
        let m: ProfanityMatch = serde_json::from_value(raw).unwrap();
        assert_eq!(m.start_time, 1.2);
        assert_eq!(m.speaker_id.as_deref(), Some("speaker_1"));
    }

    #[tokio::test]
    async fn test_suggest_alternatives_uses_backend() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "[\"darn\", \"dang\", \"drat\"]"}]}
                }]
            })))
            .mount(&server)
            .await;

        let client = AnalyzerClient::new("key").with_base_url(server.uri());
        let alts = client.suggest_alternatives("damn", 0.5, 3).await.unwrap();
        assert_eq!(alts, vec!["darn", "dang", "drat"]);
    }

    #[tokio::test]
    async fn test_suggest_alternatives_falls_back_on_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = AnalyzerClient::new("key").with_base_url(server.uri());
        let alts = client.suggest_alternatives("hell", 0.4, 2).await.unwrap();
        assert_eq!(alts, vec!["heck", "hades"]);
    }
}
