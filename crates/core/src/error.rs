//! Error types for the sessionloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all sessionloom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Opaque model capability ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    // --- Persisted state ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Caller input ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the opaque generation/classification capability.
///
/// Transient by nature: every pipeline component degrades to a documented
/// fallback instead of propagating these out of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Result does not match the requested schema: {0}")]
    InvalidSchema(String),

    #[error("Capability unreachable: {0}")]
    Unreachable(String),
}

impl CapabilityError {
    /// Short machine-friendly label, used in events and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::RateLimited { .. } => "rate_limit",
            Self::InvalidSchema(_) => "invalid_schema",
            Self::Unreachable(_) => "unreachable",
        }
    }
}

/// A structured result that parsed but failed its expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{schema}: {reason}")]
pub struct SchemaValidationError {
    pub schema: String,
    pub reason: String,
}

impl SchemaValidationError {
    pub fn new(schema: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            reason: reason.into(),
        }
    }
}

impl From<SchemaValidationError> for CapabilityError {
    fn from(err: SchemaValidationError) -> Self {
        CapabilityError::InvalidSchema(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O failure on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Persisted state at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Persisted state schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Failed to serialize persisted state: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_error_displays_correctly() {
        let err = Error::Capability(CapabilityError::RateLimited {
            retry_after_secs: 5,
        });
        assert!(err.to_string().contains("retry after 5s"));
    }

    #[test]
    fn schema_validation_maps_to_invalid_schema() {
        let err: CapabilityError =
            SchemaValidationError::new("guardrail_verdict", "no candidates").into();
        assert_eq!(err.kind(), "invalid_schema");
        assert!(err.to_string().contains("guardrail_verdict"));
        assert!(err.to_string().contains("no candidates"));
    }

    #[test]
    fn storage_error_names_the_path() {
        let err = Error::Storage(StorageError::Corrupted {
            path: PathBuf::from("/tmp/state.json"),
            reason: "expected value at line 1".into(),
        });
        assert!(err.to_string().contains("/tmp/state.json"));
        assert!(err.to_string().contains("corrupted"));
    }
}
