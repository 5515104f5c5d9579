//! Shared client plumbing.

use std::path::{Path, PathBuf};

use base64::Engine;
use reqwest::Client;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// A video input for a remote service: already-public URL, or a local file
/// the client ships inline.
#[derive(Debug, Clone)]
pub enum VideoSource {
    Url(String),
    File(PathBuf),
}

impl VideoSource {
    /// Resolve to a URI the backend accepts: URLs pass through, local files
    /// become base64 data URIs.
    pub async fn into_uri(self) -> ClientResult<String> {
        match self {
            VideoSource::Url(url) => Ok(url),
            VideoSource::File(path) => {
                let bytes = tokio::fs::read(&path).await?;
                Ok(to_data_uri(&bytes, guess_mime(&path)))
            }
        }
    }
}

/// Encode bytes as a base64 data URI.
pub fn to_data_uri(bytes: &[u8], mime: &str) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Guess a MIME type from a file extension; defaults to mp4.
pub fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("aac") => "audio/aac",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        _ => "video/mp4",
    }
}

/// Download a result artifact to a local file.
pub async fn download_to(http: &Client, url: &str, output: &Path) -> ClientResult<PathBuf> {
    debug!("Downloading result from {}", url);

    let response = http.get(url).send().await?;
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

    debug!("Downloaded {} bytes to {}", bytes.len(), output.display());
    Ok(output.to_path_buf())
}

/// Strip markdown code fences from a model's JSON response.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  [1]  "), "[1]");
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("a.PNG")), "image/png");
        assert_eq!(guess_mime(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(guess_mime(Path::new("noext")), "video/mp4");
    }

    #[test]
    fn test_to_data_uri() {
        assert_eq!(to_data_uri(b"hi", "image/png"), "data:image/png;base64,aGk=");
    }
}
