//! Error types for AuditLedger

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Structural or business-rule failure. The caller may fix the input and retry.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stored hash does not match the recomputed one.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Previous-hash or index mismatch when appending a block.
    #[error("Linkage error: {0}")]
    Linkage(String),

    /// Transaction id or hash already recorded.
    #[error("Replay detected: {0}")]
    Replay(String),

    /// Persisted or in-memory chain failed verification.
    #[error("Chain corruption detected: {0}")]
    Corruption(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::Database(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
