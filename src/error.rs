//! Error handling module for psql-helper
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Library functions return these; the binary wraps them in `anyhow`.

use thiserror::Error;

/// Main error type for psql-helper
#[derive(Error, Debug)]
pub enum PsqlHelperError {
    /// IO errors (reading, creating or committing the env file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The env file exists but could not be parsed
    #[error("Env file error: {0}")]
    EnvFile(#[from] dotenvy::Error),

    /// Credentials for the alias are already present and overwrite was not requested
    #[error("{alias} is already initialized (pass --overwrite to replace it)")]
    AlreadyInitialized { alias: String },

    /// Credentials for the alias are required but missing
    #[error("{alias} is not initialized (run `psql-helper init --alias {alias}` first)")]
    NotInitialized { alias: String },

    /// Validation errors (aliases, ports, values that cannot be stored)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Password prompt failed or was cancelled
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Credential set configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad arguments to library functions
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for psql-helper operations
pub type Result<T> = std::result::Result<T, PsqlHelperError>;

// Convenient error constructors
impl PsqlHelperError {
    /// Create an already-initialized error
    pub fn already_initialized(alias: impl Into<String>) -> Self {
        Self::AlreadyInitialized {
            alias: alias.into(),
        }
    }

    /// Create a not-initialized error
    pub fn not_initialized(alias: impl Into<String>) -> Self {
        Self::NotInitialized {
            alias: alias.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a prompt error
    pub fn prompt(msg: impl Into<String>) -> Self {
        Self::Prompt(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
