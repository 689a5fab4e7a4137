//! Structured error handling and exit codes.
//!
//! [`ScanFailure`] is the run-fatal error: the single cause stored in the
//! cancellation token when a scan ends as `Cancelled`. Item-level problems
//! (one unreadable file, one unlistable directory) are [`crate::events::ScanEvent`]s
//! and never become a `ScanFailure` unless strict mode escalates them.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::events::ScanEvent;

/// Exit codes for the dupfind binary.
///
/// - 0: Success (completed normally, duplicates found)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found (completed normally, no duplicates)
/// - 3: Partial success (completed, some files or subtrees were skipped)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: Scan completed and duplicates were found.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: Scan completed but no duplicates were found.
    NoDuplicates = 2,
    /// Partial success: Scan completed but skipped some unreadable items.
    PartialSuccess = 3,
    /// Interrupted: Scan was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DF000",
            Self::GeneralError => "DF001",
            Self::NoDuplicates => "DF002",
            Self::PartialSuccess => "DF003",
            Self::Interrupted => "DF130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DF001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}

/// The cause recorded when a scan is cancelled.
///
/// Only the first failure of a run is kept; later ones are logged and dropped.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ScanFailure {
    /// The root path does not exist, is not a directory, or cannot be listed.
    #[error("Root directory unreadable: {path}: {source}")]
    RootUnreadable {
        /// The root that was requested
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    /// The scan was interrupted by the user (Ctrl+C or termination signal).
    #[error("Scan interrupted by user")]
    Interrupted,

    /// A broken invariant or a panic inside a walker task or worker.
    #[error("Internal failure while {context}: {message}")]
    Internal {
        /// What the failing task was doing
        context: String,
        /// Panic payload or invariant description
        message: String,
    },

    /// A finder setting is outside the range the pipeline supports.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A recoverable event escalated to fatal by strict mode.
    #[error("Strict mode: {0}")]
    Escalated(ScanEvent),
}

impl ScanFailure {
    /// Build a [`ScanFailure::RootUnreadable`] from an I/O error.
    #[must_use]
    pub fn root_unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::RootUnreadable {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// The exit code the binary reports for this failure.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Interrupted => ExitCode::Interrupted,
            _ => ExitCode::GeneralError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, Phase};

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::NoDuplicates.as_i32(), 2);
        assert_eq!(ExitCode::PartialSuccess.as_i32(), 3);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
        assert_eq!(ExitCode::Interrupted.code_prefix(), "DF130");
    }

    #[test]
    fn test_scan_failure_display() {
        let err = ScanFailure::root_unreadable(
            "/missing",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(
            err.to_string(),
            "Root directory unreadable: /missing: no such file"
        );

        let err = ScanFailure::Internal {
            context: "hashing /a".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Internal failure while hashing /a: boom");
    }

    #[test]
    fn test_scan_failure_exit_codes() {
        assert_eq!(ScanFailure::Interrupted.exit_code(), ExitCode::Interrupted);
        let event = ScanEvent::new(
            Phase::Hashing,
            PathBuf::from("/x"),
            EventKind::IoFailure,
            "bad sector",
        );
        assert_eq!(
            ScanFailure::Escalated(event).exit_code(),
            ExitCode::GeneralError
        );
    }

    #[test]
    fn test_structured_error_from_anyhow() {
        let err = anyhow::Error::new(ScanFailure::Interrupted);
        let structured = StructuredError::new(&err, ExitCode::Interrupted);
        assert_eq!(structured.code, "DF130");
        assert!(structured.interrupted);
        assert_eq!(structured.message, "Scan interrupted by user");
    }
}
