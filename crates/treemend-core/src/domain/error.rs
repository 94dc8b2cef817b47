//! Domain-level error taxonomy for treemend.
//!
//! Only configuration problems and a missing scan root surface as errors.
//! Per-file, per-rule and per-check failures are recorded in the run
//! report instead of being raised.

use std::path::PathBuf;

/// treemend domain errors.
#[derive(Debug, thiserror::Error)]
pub enum TreemendError {
    #[error("root path does not exist or is not a directory: {0}")]
    RootNotFound(PathBuf),

    #[error("invalid rule {id}: {reason}")]
    InvalidRule { id: String, reason: String },

    #[error("invalid corruption signature {id}: {reason}")]
    InvalidSignature { id: String, reason: String },

    #[error("invalid template for role {role}: {reason}")]
    InvalidTemplate { role: String, reason: String },

    #[error("invalid strictness ladder for {tool}: {reason}")]
    InvalidLadder { tool: String, reason: String },

    #[error("invalid check {name}: {reason}")]
    InvalidCheck { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for treemend operations.
pub type Result<T> = std::result::Result<T, TreemendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_not_found_display() {
        let err = TreemendError::RootNotFound(PathBuf::from("/nope"));
        assert!(err.to_string().contains("/nope"));
    }

    #[test]
    fn test_invalid_rule_display() {
        let err = TreemendError::InvalidRule {
            id: "doubled-semicolon".to_string(),
            reason: "duplicate id".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("doubled-semicolon"));
        assert!(msg.contains("duplicate id"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = TreemendError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
