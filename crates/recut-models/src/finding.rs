//! Compliance analysis findings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Category of a compliance finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FindingCategory {
    Alcohol,
    Logo,
    Violence,
    Language,
    Other,
}

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Warning,
    Critical,
}

/// Analyzer confidence level. Accepts the lowercase spellings some model
/// responses use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Confidence {
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
}

/// Overall risk assessment for a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

/// Bounding box in percentages of the frame (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// A single compliance finding within a video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub category: FindingCategory,
    /// Brief description of what was detected.
    pub content: String,
    pub start_time: f64,
    pub end_time: f64,
    pub status: FindingStatus,
    pub confidence: Confidence,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub box_: Option<BoundingBox>,
    pub suggested_action: String,
}

/// Full video compliance analysis.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnalysis {
    /// Findings sorted by start time.
    pub findings: Vec<Finding>,
    pub summary: String,
    pub risk_level: RiskLevel,
    pub predicted_age_rating: String,
}

impl VideoAnalysis {
    /// Sort findings by start time; the wire contract guarantees order.
    pub fn sort_findings(&mut self) {
        self.findings
            .sort_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap_or(std::cmp::Ordering::Equal));
    }
}

/// Result of analyzing a user-selected frame region.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegionAnalysis {
    pub item_name: String,
    pub reasoning: String,
    pub confidence: Confidence,
    pub suggested_actions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_wire_format() {
        let f = Finding {
            category: FindingCategory::Alcohol,
            content: "person drinking beer".to_string(),
            start_time: 3.0,
            end_time: 5.5,
            status: FindingStatus::Critical,
            confidence: Confidence::High,
            box_: Some(BoundingBox {
                top: 10.0,
                left: 20.0,
                width: 15.0,
                height: 30.0,
            }),
            suggested_action: "blur".to_string(),
        };
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["category"], "alcohol");
        assert_eq!(json["status"], "critical");
        assert_eq!(json["confidence"], "High");
        assert!(json.get("startTime").is_some());
        assert!(json.get("suggestedAction").is_some());
    }

    #[test]
    fn test_sort_findings() {
        let mut analysis = VideoAnalysis {
            findings: vec![
                Finding {
                    category: FindingCategory::Logo,
                    content: "logo".into(),
                    start_time: 7.0,
                    end_time: 9.0,
                    status: FindingStatus::Warning,
                    confidence: Confidence::Medium,
                    box_: None,
                    suggested_action: "pixelate".into(),
                },
                Finding {
                    category: FindingCategory::Violence,
                    content: "fight".into(),
                    start_time: 1.0,
                    end_time: 2.0,
                    status: FindingStatus::Critical,
                    confidence: Confidence::High,
                    box_: None,
                    suggested_action: "cut".into(),
                },
            ],
            summary: String::new(),
            risk_level: RiskLevel::Moderate,
            predicted_age_rating: "12+".into(),
        };
        analysis.sort_findings();
        assert_eq!(analysis.findings[0].start_time, 1.0);
    }
}
