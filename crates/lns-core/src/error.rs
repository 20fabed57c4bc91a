//! Core error types

use thiserror::Error;

/// Errors raised while handling identifiers and parsed frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// An identifier string could not be parsed
    #[error("Invalid {kind} identifier: {value}")]
    InvalidId { kind: &'static str, value: String },

    /// A frame of the wrong type was handed to an operation
    #[error("Expected a {expected} frame")]
    WrongFrameType { expected: &'static str },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, FrameError>;
