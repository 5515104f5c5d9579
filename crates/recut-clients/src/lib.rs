//! Stateless clients for the remote AI services.
//!
//! Each client wraps one capability behind a small surface:
//! - [`SegmentationClient`]: text-prompted video mask generation
//! - [`GenerativeEditClient`]: video+prompt to edited video
//! - [`TtsClient`]: speech synthesis and voice cloning
//! - [`AnalyzerClient`]: compliance findings, profanity timings, word
//!   suggestions, and prompt simplification
//!
//! The orchestrator depends only on these capabilities; which vendor sits
//! behind each base URL is a configuration concern. Errors are classified
//! into [`ClientError`]; rate limits are retried by the caller, not here.

pub mod analyzer;
pub mod common;
pub mod error;
pub mod generative;
pub mod segmentation;
pub mod tts;

pub use analyzer::AnalyzerClient;
pub use common::VideoSource;
pub use error::{ClientError, ClientResult};
pub use generative::{EditRequest, GenerativeEditClient};
pub use segmentation::{SegmentationClient, SegmentationOutput};
pub use tts::{TtsClient, VoicePresets};
