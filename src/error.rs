//! Error types for timeranger
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TrangerError
pub type Result<T> = std::result::Result<T, TrangerError>;

/// Unified error type for timeranger operations
#[derive(Debug, Error)]
pub enum TrangerError {
    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    #[error("Not master: {0}")]
    NotMaster(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // On-disk Invariant Violations
    // -------------------------------------------------------------------------
    #[error("Index corruption detected: {0}")]
    Corruption(String),

    /// A write the on-disk invariants depend on failed (index record,
    /// database or topic directory)
    #[error("Storage failure at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid key pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl TrangerError {
    /// Whether this error means the on-disk invariants no longer hold
    pub fn is_critical(&self) -> bool {
        matches!(self, TrangerError::Corruption(_) | TrangerError::Storage { .. })
    }

    pub(crate) fn storage(path: &std::path::Path, source: std::io::Error) -> Self {
        TrangerError::Storage {
            path: path.display().to_string(),
            source,
        }
    }
}
