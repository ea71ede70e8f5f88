//! Error types for the record ledger.

use thiserror::Error;

/// Main error type for ledger, registry and view operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record type name already in use: {0}")]
    DuplicateName(String),

    #[error("Unknown matcher kind: {0}")]
    UnknownMatcherKind(String),

    #[error("Index {index} out of range (len is {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid colour: {0}")]
    InvalidColour(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid capture format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl LedgerError {
    /// True for errors a UI should treat as "selection no longer valid".
    pub fn is_stale_index(&self) -> bool {
        matches!(self, LedgerError::IndexOutOfRange { .. })
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for LedgerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for LedgerError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        LedgerError::Deserialization(e.to_string())
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
