//! Error types for tenure-core.

use thiserror::Error;

/// Result type alias using tenure-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for session operations
#[derive(Error, Debug)]
pub enum Error {
    // Storage errors
    #[error("Invalid storage state: {0}")]
    InvalidState(String),

    // Lifecycle errors
    #[error("Session validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid session name: {0}")]
    InvalidName(String),

    #[error("Operation out of sequence: {0}")]
    OutOfSequence(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Backend errors
    #[error("Session backend error: {0}")]
    Backend(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl Error {
    /// Create an invalid-state error for a rejected store mutation
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a validation-failure error naming the rejecting validator
    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    /// Create an invalid-name error
    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }

    /// Create an out-of-sequence error
    pub fn out_of_sequence(msg: impl Into<String>) -> Self {
        Self::OutOfSequence(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
