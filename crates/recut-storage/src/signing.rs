//! V4 signed URLs via IAM signBlob impersonation, plus the data-URI fallback.
//!
//! Hosted compute rarely carries a service-account private key, so direct
//! RSA signing is unavailable. Instead the canonical request is hashed
//! locally and the signature is produced remotely by the IAM credentials
//! `signBlob` RPC under the configured signer identity.

use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::client::GcsClient;
use crate::error::{StorageError, StorageResult};
use crate::DATA_URI_LIMIT_BYTES;

const SIGN_ALGORITHM: &str = "GOOG4-RSA-SHA256";
const SIGN_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

impl GcsClient {
    /// Produce a V4 signed URL for `key` using impersonated signing.
    pub async fn signed_url(
        &self,
        key: &str,
        method: &str,
        ttl: Duration,
    ) -> StorageResult<String> {
        let signer = self
            .signer()
            .ok_or_else(|| StorageError::sign_failed("No signer service account configured"))?
            .to_string();

        let now = Utc::now();
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let request = CanonicalRequest::new(
            method,
            self.bucket(),
            key,
            &signer,
            &timestamp,
            &date,
            ttl.as_secs(),
        );
        let string_to_sign = request.string_to_sign();

        // Sign remotely under the impersonated identity.
        let token = self.token(SIGN_SCOPE).await?;
        let url = format!(
            "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/{}:signBlob",
            signer
        );
        let payload = base64::engine::general_purpose::STANDARD.encode(string_to_sign.as_bytes());

        let response = self
            .http()
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "payload": payload }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::sign_failed(format!(
                "signBlob as {} failed with {}: {}",
                signer, status, body
            )));
        }

        let signed: SignBlobResponse = response.json().await?;
        let signature_bytes = base64::engine::general_purpose::STANDARD
            .decode(&signed.signed_blob)
            .map_err(|e| StorageError::sign_failed(format!("Bad signBlob response: {}", e)))?;
        let signature = hex::encode(signature_bytes);

        debug!("Signed gs://{}/{} as {}", self.bucket(), key, signer);
        Ok(request.into_url(&signature))
    }
}

#[derive(Debug, Deserialize)]
struct SignBlobResponse {
    #[serde(rename = "signedBlob")]
    signed_blob: String,
}

/// The V4 canonical request pieces for a host-only signed URL.
struct CanonicalRequest {
    method: String,
    path: String,
    query: String,
    timestamp: String,
    scope: String,
}

impl CanonicalRequest {
    fn new(
        method: &str,
        bucket: &str,
        key: &str,
        signer: &str,
        timestamp: &str,
        date: &str,
        expires_secs: u64,
    ) -> Self {
        let scope = format!("{}/auto/storage/goog4_request", date);
        let credential = format!("{}/{}", signer, scope);

        let path = format!("/{}/{}", bucket, encode_path(key));

        // Query parameters in lexicographic order, values percent-encoded.
        let query = format!(
            "X-Goog-Algorithm={}&X-Goog-Credential={}&X-Goog-Date={}&X-Goog-Expires={}&X-Goog-SignedHeaders=host",
            SIGN_ALGORITHM,
            urlencoding::encode(&credential),
            timestamp,
            expires_secs
        );

        Self {
            method: method.to_string(),
            path,
            query,
            timestamp: timestamp.to_string(),
            scope,
        }
    }

    fn canonical_request(&self) -> String {
        format!(
            "{}\n{}\n{}\nhost:storage.googleapis.com\n\nhost\nUNSIGNED-PAYLOAD",
            self.method, self.path, self.query
        )
    }

    fn string_to_sign(&self) -> String {
        let hash = hex::encode(Sha256::digest(self.canonical_request().as_bytes()));
        format!(
            "{}\n{}\n{}\n{}",
            SIGN_ALGORITHM, self.timestamp, self.scope, hash
        )
    }

    fn into_url(self, signature_hex: &str) -> String {
        format!(
            "https://storage.googleapis.com{}?{}&X-Goog-Signature={}",
            self.path, self.query, signature_hex
        )
    }
}

/// Percent-encode a key for the URL path, preserving `/` separators.
fn encode_path(key: &str) -> String {
    key.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Encode bytes as an inline `data:` URI.
///
/// The fallback when no URL can be produced at all; payloads past the size
/// ceiling are rejected as `Unsignable` so callers surface a clear error
/// instead of an opaque backend rejection.
pub fn data_uri(bytes: &[u8], content_type: &str) -> StorageResult<String> {
    if bytes.len() > DATA_URI_LIMIT_BYTES {
        return Err(StorageError::Unsignable(format!(
            "Payload of {} bytes exceeds the {} byte data-URI limit",
            bytes.len(),
            DATA_URI_LIMIT_BYTES
        )));
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", content_type, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_request_layout() {
        let req = CanonicalRequest::new(
            "GET",
            "my-bucket",
            "jobs/abc123/input.mp4",
            "signer@project.iam.gserviceaccount.com",
            "20260301T120000Z",
            "20260301",
            900,
        );

        let canonical = req.canonical_request();
        let lines: Vec<&str> = canonical.split('\n').collect();
        assert_eq!(lines[0], "GET");
        assert_eq!(lines[1], "/my-bucket/jobs/abc123/input.mp4");
        assert!(lines[2].starts_with("X-Goog-Algorithm=GOOG4-RSA-SHA256"));
        assert!(lines[2].contains("X-Goog-Expires=900"));
        assert_eq!(lines[3], "host:storage.googleapis.com");
        assert_eq!(lines[5], "host");
        assert_eq!(lines[6], "UNSIGNED-PAYLOAD");
    }

    #[test]
    fn test_string_to_sign_scope() {
        let req = CanonicalRequest::new(
            "GET",
            "b",
            "k.mp4",
            "sa@p.iam.gserviceaccount.com",
            "20260301T120000Z",
            "20260301",
            600,
        );
        let sts = req.string_to_sign();
        let lines: Vec<&str> = sts.split('\n').collect();
        assert_eq!(lines[0], "GOOG4-RSA-SHA256");
        assert_eq!(lines[1], "20260301T120000Z");
        assert_eq!(lines[2], "20260301/auto/storage/goog4_request");
        assert_eq!(lines[3].len(), 64); // sha256 hex digest
    }

    #[test]
    fn test_signed_url_shape() {
        let req = CanonicalRequest::new(
            "GET",
            "b",
            "jobs/x/y.mp4",
            "sa@p.iam.gserviceaccount.com",
            "20260301T120000Z",
            "20260301",
            600,
        );
        let url = req.into_url("deadbeef");
        assert!(url.starts_with("https://storage.googleapis.com/b/jobs/x/y.mp4?"));
        assert!(url.ends_with("&X-Goog-Signature=deadbeef"));
    }

    #[test]
    fn test_data_uri_small_payload() {
        let uri = data_uri(b"hello", "video/mp4").unwrap();
        assert_eq!(uri, "data:video/mp4;base64,aGVsbG8=");
    }

    #[test]
    fn test_data_uri_rejects_large_payload() {
        let big = vec![0u8; DATA_URI_LIMIT_BYTES + 1];
        assert!(matches!(
            data_uri(&big, "video/mp4"),
            Err(StorageError::Unsignable(_))
        ));
    }
}
