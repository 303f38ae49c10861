//! Structured error handling and exit codes.

use serde::Serialize;

use crate::coordinator::RunReport;

/// Exit codes for the cachepatch binary.
///
/// - 0: Success (patched, already patched, or cache cleared)
/// - 1: General error (unexpected failure)
/// - 2: Not found (no original or patched entry in the cache)
/// - 3: Environment not ready (cache missing, or host in the way)
/// - 4: Fetch failed (no reference stylesheet)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the cache holds the patched stylesheet.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Not found: neither form of the stylesheet is cached.
    NotFound = 2,
    /// Environment not ready: the host has not populated its cache.
    EnvironmentNotReady = 3,
    /// Fetch failed: the reference stylesheet could not be obtained.
    FetchFailed = 4,
    /// Interrupted: stopped by the user (Ctrl+C).
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
            Self::Success => "CP000",
            Self::GeneralError => "CP001",
            Self::NotFound => "CP002",
            Self::EnvironmentNotReady => "CP003",
            Self::FetchFailed => "CP004",
            Self::Interrupted => "CP130",
        }
    }

    /// Exit code for a pipeline report.
    #[must_use]
    pub fn from_report(report: &RunReport) -> Self {
        match report {
            RunReport::Patched(_)
            | RunReport::AlreadyPatched
            | RunReport::Cleared
            | RunReport::Suppressed => Self::Success,
            RunReport::NotFound => Self::NotFound,
            RunReport::EnvironmentNotReady(_) => Self::EnvironmentNotReady,
            RunReport::FetchFailed => Self::FetchFailed,
            RunReport::Failed(_) => Self::GeneralError,
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "CP001")
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
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
