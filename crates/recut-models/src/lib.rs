//! Shared data models for the recut backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, processing stages, and persisted job snapshots
//! - Probed video metadata
//! - Compliance analysis findings
//! - Profanity matches, merging, and dub-phrase clustering

pub mod finding;
pub mod job;
pub mod profanity;
pub mod video;

pub use finding::{
    BoundingBox, Confidence, Finding, FindingCategory, FindingStatus, RegionAnalysis, RiskLevel,
    VideoAnalysis,
};
pub use job::{Job, JobId, JobSnapshot, ProfanityCache, Stage};
pub use profanity::{cluster_phrases, merge_adjacent, DubPhrase, ProfanityMatch};
pub use video::VideoInfo;
