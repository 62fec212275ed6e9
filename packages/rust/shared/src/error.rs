//! Error types for Tenderfold.
//!
//! Library crates use [`TenderfoldError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! The taxonomy mirrors how failures are handled: `Io`/`Compose`/`Convert`
//! abort only the current artifact, `Archive` drops only the offending
//! entry, and `Config`/`Validation` are the run-fatal ones.

use std::path::PathBuf;

/// Top-level error type for all Tenderfold operations.
#[derive(Debug, thiserror::Error)]
pub enum TenderfoldError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Archive extraction or bundling error.
    #[error("archive error: {0}")]
    Archive(String),

    /// Network/HTTP error against the remote store.
    #[error("network error: {0}")]
    Network(String),

    /// Document conversion (external converter) error.
    #[error("convert error: {0}")]
    Convert(String),

    /// PDF composition error.
    #[error("compose error: {0}")]
    Compose(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Structural/input validation error (bad root, no projects found, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TenderfoldError>;

impl TenderfoldError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an archive error from any displayable message.
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a compose error from any displayable message.
    pub fn compose(msg: impl Into<String>) -> Self {
        Self::Compose(msg.into())
    }

    /// Create a convert error from any displayable message.
    pub fn convert(msg: impl Into<String>) -> Self {
        Self::Convert(msg.into())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TenderfoldError::config("missing layout section");
        assert_eq!(err.to_string(), "config error: missing layout section");

        let err = TenderfoldError::validation("no project roots under /tmp/x");
        assert!(err.to_string().contains("no project roots"));
    }
}
