//! Error taxonomy for the embedding catalogue and recognition engine.
//!
//! Errors that concern a single write or request are reported to the caller of
//! that operation. [`EngineError::EmptyIndex`] and [`EngineError::CacheUnavailable`]
//! are recovered inside the crate and never reach a service caller.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the catalogue, index, enrollment, and cache layers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A vector's length differs from the catalogue's established dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A vector with zero (or non-finite) L2 norm cannot be normalized.
    #[error("degenerate vector: L2 norm is zero or not finite")]
    DegenerateVector,

    /// Enrollment did not collect enough valid per-frame embeddings.
    #[error("insufficient samples: required {required}, got {got}")]
    InsufficientSamples { required: usize, got: usize },

    /// Search was attempted against an index with no rows.
    #[error("similarity index is empty")]
    EmptyIndex,

    /// The persisted catalogue could not be decoded.
    #[error("catalogue at {} is corrupt: {reason}", path.display())]
    PersistenceCorruption { path: PathBuf, reason: String },

    /// The cache backend could not be reached.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// An external collaborator did not answer in time.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// The detector capability failed.
    #[error("detector failed: {0}")]
    Detector(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convenience alias used throughout the library.
pub type EngineResult<T> = Result<T, EngineError>;
