//! Domain error types for the results importer.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use crate::config::ConfigError;
use crate::parsers::ParseError;
use crate::qc::QcError;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A result file could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The Quality Center boundary reported a fault
    #[error("Quality Center error: {0}")]
    Remote(QcError),

    /// Invalid input data (bad destination, empty selection, ...)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// No enabled parser accepted the file
    #[error("No parser found for file: {0}")]
    NoParser(String),

    /// Local file system operation failed
    #[error("File system error: {0}")]
    FileSystem(String),

    /// Connection history could not be read or written
    #[error("History error: {0}")]
    History(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unexpected failure, e.g. a panicked worker
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error was raised before any remote call was attempted.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<QcError> for AppError {
    fn from(err: QcError) -> Self {
        match err {
            QcError::InvalidPath(_) | QcError::InvalidInput(_) => {
                AppError::Validation(err.to_string())
            }
            other => AppError::Remote(other),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileSystem(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::History(format!("JSON parsing error: {}", err))
    }
}
