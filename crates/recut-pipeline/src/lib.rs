//! Pipeline engine: job store, edit operations, and the orchestrator facade.
//!
//! Jobs are created on upload, mutated by exactly one operation at a time
//! (per-job lock), persisted after every stage transition, and chained: each
//! edit consumes the previous operation's output. The four edit operations
//! (blur/pixelate, generative replace, beep, dub) share the smart-clip +
//! stitch fabric and the content-addressed mask cache.

pub mod chunking;
pub mod config;
pub mod error;
pub mod mask_cache;
pub mod ops;
pub mod orchestrator;
pub mod retry;
pub mod smart_clip;
pub mod store;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use ops::beep::BeepParams;
pub use ops::blur::{BlurParams, EffectKind};
pub use ops::dub::{DubParams, VoiceChoice};
pub use ops::replace::ReplaceParams;
pub use orchestrator::{CensorOutcome, EditOutcome, Pipeline, StatusInfo, Suggestion, UploadOutcome};
pub use store::JobStore;
