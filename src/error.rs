//! Error types for cape resolution and storage.

use thiserror::Error;

/// Storage-related errors (record store and content store)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid content key: {0}")]
    InvalidKey(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<StorageError>> for StorageError {
    fn from(err: sled::transaction::TransactionError<StorageError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => e.into(),
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors surfaced by the resolution engine.
///
/// `Clone` so that coalesced waiters on the same in-flight resolution can all
/// receive the leader's result.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("Invalid player: {0}")]
    InvalidPlayer(String),

    #[error("{requested} is not supported. ({})", supported.join(","))]
    UnsupportedType {
        requested: String,
        supported: Vec<String>,
    },

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetchFailure(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ResolveError {
    /// HTTP-equivalent status family for the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            ResolveError::InvalidPlayer(_) | ResolveError::UnsupportedType { .. } => 400,
            ResolveError::PlayerNotFound(_) => 404,
            ResolveError::Timeout { .. } => 504,
            ResolveError::UpstreamFetchFailure(_)
            | ResolveError::ImageProcessing(_)
            | ResolveError::StorageFailure(_)
            | ResolveError::Config(_) => 500,
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolveError::UpstreamFetchFailure(_) | ResolveError::Timeout { .. }
        )
    }
}

impl From<StorageError> for ResolveError {
    fn from(err: StorageError) -> Self {
        ResolveError::StorageFailure(err.to_string())
    }
}

impl From<config::ConfigError> for ResolveError {
    fn from(err: config::ConfigError) -> Self {
        ResolveError::Config(err.to_string())
    }
}
