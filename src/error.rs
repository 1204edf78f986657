//! Error types for the Turnstile service.

use thiserror::Error;

/// Failures of a timestamp log or quota backend.
///
/// Any of these means a rate limit decision could not be made. They are never
/// turned into an admit or a deny.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or failed mid-operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limit that is zero or negative
    #[error("Invalid rate limit {0}: limits must be positive")]
    InvalidLimit(i64),

    /// Storage errors from the log or quota backend
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
