//! Error types for the shared-state layer

use thiserror::Error;

/// Errors that can occur in cache-store, synchroniser and getter operations
#[derive(Error, Debug)]
pub enum StateError {
    /// The distributed key-value store raised
    #[error("KV store error: {0}")]
    Kv(String),

    /// The device registry raised
    #[error("Registry error: {0}")]
    Registry(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Waiting on another resolver timed out
    #[error("Timed out after {waited_ms}ms waiting for cache population")]
    Timeout { waited_ms: u64 },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StateError {
    /// Check if retrying the operation can reasonably succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            StateError::Kv(_) | StateError::Registry(_) | StateError::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Result type for shared-state operations
pub type Result<T> = std::result::Result<T, StateError>;
