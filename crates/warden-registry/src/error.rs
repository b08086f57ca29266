//! Error types for the registry boundary.

use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur against the external registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry connection error: {0}")]
    Connect(String),

    #[error("read error at {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("watch installation failed for {path}: {reason}")]
    Watch { path: String, reason: String },

    #[error("no such path: {0}")]
    NotFound(String),

    #[error("invalid registry data at {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid cluster pattern: {0}")]
    Pattern(#[from] regex::Error),
}
