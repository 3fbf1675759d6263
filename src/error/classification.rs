/// Error categories and process exit statuses
///
/// Every pipeline failure falls into exactly one `ErrorCategory`, which decides
/// how far the failure reaches (the whole run, or one device) and which exit
/// status a CLI wrapper reports.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// A required external tool is missing. Fatal to the whole run.
    Configuration,

    /// Device vanished, permission denied, OS-level I/O error, settle timeout.
    /// Fatal to that device's pipeline only.
    Device,

    /// An external tool ran and returned a failure status.
    /// Fatal to that device's pipeline only.
    CommandFailure,

    /// User-initiated. Terminal, not an error.
    Cancelled,
}

impl ErrorCategory {
    /// Whether the failure should stop every device, not just this one
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, ErrorCategory::Configuration)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "ConfigurationError"),
            ErrorCategory::Device => write!(f, "DeviceError"),
            ErrorCategory::CommandFailure => write!(f, "CommandFailure"),
            ErrorCategory::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// What the failure milestone tells the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ToolNotFound,
    CommandFailed,
    PermissionDenied,
    OsError,
    UserCancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureKind::ToolNotFound => "required command not found",
            FailureKind::CommandFailed => "command execution failed",
            FailureKind::PermissionDenied => "permission denied",
            FailureKind::OsError => "OS error",
            FailureKind::UserCancelled => "interrupted by user",
        };
        f.write_str(text)
    }
}

/// Exit status convention for CLI wrappers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExitStatus {
    Success,
    /// At least one device's pipeline failed
    DeviceFailures,
    /// The run was interrupted by the user
    Interrupted,
    /// Missing tool, invalid request or unreadable configuration
    Configuration,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::DeviceFailures => 1,
            ExitStatus::Configuration => 2,
            ExitStatus::Interrupted => 130,
        }
    }

    /// Keep the more severe of two statuses
    pub fn worst(self, other: ExitStatus) -> ExitStatus {
        self.max(other)
    }
}
