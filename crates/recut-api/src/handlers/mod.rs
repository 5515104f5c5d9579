//! HTTP handlers.

pub mod analyze;
pub mod audio;
pub mod edits;
pub mod status;
pub mod upload;

use axum::Json;
use serde_json::json;

use recut_models::JobId;

use crate::error::{ApiError, ApiResult};

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Parse and validate a job id path parameter.
///
/// Valid format: alphanumeric, 8-64 chars. Rejecting early keeps path
/// fragments out of filesystem lookups.
pub fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    let valid = (8..=64).contains(&raw.len()) && raw.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid {
        return Err(ApiError::bad_request("Invalid job ID format"));
    }
    Ok(JobId::from_string(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id() {
        assert!(parse_job_id("abc12345").is_ok());
        assert!(parse_job_id("short").is_err());
        assert!(parse_job_id("has space").is_err());
        assert!(parse_job_id("../../etc").is_err());
        assert!(parse_job_id(&"a".repeat(65)).is_err());
    }
}
