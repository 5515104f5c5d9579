//! Google Cloud Storage blob adapter.
//!
//! Uniform object-store surface for the pipeline: upload bytes or files
//! under a key, download, existence checks, prefix listing, small JSON state
//! blobs, and URL production. When the runtime has no private key for direct
//! signing, V4 signed URLs are produced by impersonating a configured
//! service identity through the IAM `signBlob` RPC; when no signer is
//! available at all, small payloads fall back to inline data URIs.

pub mod client;
pub mod error;
pub mod signing;

pub use client::{GcsClient, GcsConfig, ObjectInfo};
pub use error::{StorageError, StorageResult};
pub use signing::data_uri;

/// Inline data-URI fallback ceiling; generative backends reject larger bodies.
pub const DATA_URI_LIMIT_BYTES: usize = 5 * 1024 * 1024;
