//! Error types for ccreport
//!
//! All errors derive from `thiserror` for convenient handling and automatic
//! `From` implementations. Note that most parsing-level problems (malformed
//! log lines, unknown models, unparsable timestamps) are *not* errors: they
//! are absorbed as diagnostics so a report run always completes with
//! whatever it could aggregate. Only resource-availability failures surface
//! through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ccreport operations
#[derive(Error, Debug)]
pub enum CcreportError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// None of the configured source roots exists or is readable
    #[error("no readable usage-log source found (looked at: {0:?})")]
    SourceUnavailable(Vec<PathBuf>),

    /// Pricing table file could not be read or parsed
    #[error("failed to load pricing table from {}: {reason}", path.display())]
    PricingTable {
        /// Location of the pricing table file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Export destination could not be written
    #[error("failed to write export to {}: {source}", path.display())]
    ExportIo {
        /// The destination that failed
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Invalid date format in a filter argument
    #[error("invalid date format: {0}")]
    InvalidDate(String),

    /// Invalid timezone name
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience type alias for Results in ccreport
pub type Result<T> = std::result::Result<T, CcreportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CcreportError::InvalidDate("2024-13".to_string());
        assert_eq!(error.to_string(), "invalid date format: 2024-13");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CcreportError = io_error.into();
        assert!(matches!(err, CcreportError::Io(_)));
    }
}
