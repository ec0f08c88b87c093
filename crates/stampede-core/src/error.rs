use std::path::PathBuf;

use thiserror::Error;

/// Canonical error type for configuration, scenario and fixture operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required file or entity does not exist.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"data file"`).
        entity: &'static str,
        /// Identifier or path of the missing entity.
        id: String,
    },

    /// The file extension does not map to a supported format.
    #[error("unsupported file format `{extension}` for {}", path.display())]
    UnsupportedFormat {
        /// Offending extension, lowercased, including the leading dot.
        extension: String,
        /// Path that was requested.
        path: PathBuf,
    },

    /// A document could not be parsed or resolved.
    #[error("failed to parse {}: {message}", path.display())]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Human-readable parser message.
        message: String,
    },

    /// Operation violates the current state machine rules.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// Validation error for user-supplied settings.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },
}

impl CoreError {
    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a `Parse` variant.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
