//! Error types for Strata.

use thiserror::Error;

/// Main error type for Strata operations.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid property name: {0:?}")]
    InvalidName(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Service closed: {0}")]
    Closed(String),

    #[error("No input connected at index {0}")]
    NotConnected(usize),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Factory error: {0}")]
    Factory(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;
