//! Edit operations: the remediation primitives.
//!
//! Each operation consumes a job and parameters and produces a new output
//! video. Operation state transitions, persistence, and per-job locking are
//! handled by the orchestrator; the functions here do the actual work.

pub mod beep;
pub mod blur;
pub mod dub;
pub mod replace;
