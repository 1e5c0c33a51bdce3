//! Error types for admitbot.
//!
//! Library crates use [`AdmitBotError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all admitbot operations.
#[derive(Debug, thiserror::Error)]
pub enum AdmitBotError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during a page fetch or document download.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Headless browser render failed or timed out.
    #[error("render error: {0}")]
    Render(String),

    /// A program's curriculum document could not be acquired.
    #[error("acquisition error: {0}")]
    Acquisition(String),

    /// Remote document store (list/delete/upload) failure.
    #[error("remote store error: {0}")]
    RemoteStore(String),

    /// Completion API error (auth, transport, or response shape).
    #[error("completion error: {0}")]
    Completion(String),

    /// Chat transport failure (sending or deleting a message).
    #[error("transport error: {0}")]
    Transport(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, empty registry, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AdmitBotError>;

impl AdmitBotError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
