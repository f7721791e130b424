//! Error types for the Tollgate crate.

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Invalid bucket or bandwidth configuration, rejected before any consume
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The backing store is unreachable or timed out
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The compare-and-swap retry budget was exhausted for a key
    #[error("Store contention on key '{key}': gave up after {attempts} attempts")]
    StoreContention { key: String, attempts: u32 },

    /// Stored bucket state could not be decoded
    #[error("Corrupt state: {0}")]
    CorruptState(String),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for TollgateError {
    fn from(e: redis::RedisError) -> Self {
        TollgateError::StoreUnavailable(e.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
