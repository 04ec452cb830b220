//! Error types for the Montage engine.

use thiserror::Error;

/// Main error type for Montage operations.
#[derive(Error, Debug)]
pub enum MontageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Timeline error: {0}")]
    Timeline(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Montage operations.
pub type Result<T> = std::result::Result<T, MontageError>;
