/// Error taxonomy for the erase-partition-format pipeline
///
/// Errors are produced in two layers:
///
/// ```text
/// stage functions ──► StageError          (what went wrong)
///                        │ .at(identity, stage)
///                        ↓
/// pipeline ─────────► EraseError          (which device, which stage)
///                        │ .category()
///                        ↓
/// fleet ────────────► ErrorCategory / ExitStatus
/// ```
///
/// Stage functions never swallow errors. They return a `StageError`, the
/// pipeline annotates it with the stable device identity and the failing
/// stage, and the fleet aggregates the result without touching sibling
/// pipelines.
pub mod classification;

pub use classification::{ErrorCategory, ExitStatus, FailureKind};

use crate::tools::ToolError;
use crate::{DeviceIdentity, Stage};
use std::io;
use thiserror::Error;

/// OS-level reasons a device operation failed
#[derive(Error, Debug)]
pub enum DeviceFault {
    #[error("permission denied: {0}")]
    PermissionDenied(#[source] io::Error),

    #[error("device not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unusable device: {0}")]
    Unusable(String),
}

impl DeviceFault {
    /// Classify an I/O error by its kind
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => DeviceFault::PermissionDenied(err),
            io::ErrorKind::NotFound => DeviceFault::NotFound(err.to_string()),
            _ => DeviceFault::Io(err),
        }
    }
}

/// Failure of a single stage, before it is attributed to a device
#[derive(Error, Debug)]
pub enum StageError {
    #[error("required tool `{0}` not found")]
    ToolMissing(String),

    #[error("`{command}` exited with {}: {stderr}", exit_text(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error(transparent)]
    Device(#[from] DeviceFault),

    #[error("operation cancelled by user")]
    Cancelled,
}

impl From<io::Error> for StageError {
    fn from(err: io::Error) -> Self {
        StageError::Device(DeviceFault::from_io(err))
    }
}

impl From<ToolError> for StageError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(tool) => StageError::ToolMissing(tool),
            ToolError::Spawn { source, .. } => StageError::from(source),
        }
    }
}

impl StageError {
    /// Exit status for a failure outside any pipeline, such as listing disks
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            StageError::ToolMissing(_) => ExitStatus::Configuration,
            StageError::Cancelled => ExitStatus::Interrupted,
            StageError::CommandFailed { .. } | StageError::Device(_) => ExitStatus::DeviceFailures,
        }
    }

    /// Attribute this failure to a device and stage
    pub fn at(self, device: &DeviceIdentity, stage: Stage) -> EraseError {
        let device = device.clone();
        match self {
            StageError::ToolMissing(tool) => EraseError::Configuration {
                device,
                stage,
                tool,
            },
            StageError::CommandFailed {
                command,
                code,
                stderr,
            } => EraseError::CommandFailure {
                device,
                stage,
                command,
                code,
                stderr,
            },
            StageError::Device(fault) => EraseError::Device {
                device,
                stage,
                fault,
            },
            StageError::Cancelled => EraseError::Cancelled { device, stage },
        }
    }
}

/// Pipeline-level failure carrying the stable identity and failing stage
#[derive(Error, Debug)]
pub enum EraseError {
    #[error("{device}: {stage} stage needs `{tool}`, which is not installed")]
    Configuration {
        device: DeviceIdentity,
        stage: Stage,
        tool: String,
    },

    #[error("{device}: {stage} stage failed: {fault}")]
    Device {
        device: DeviceIdentity,
        stage: Stage,
        #[source]
        fault: DeviceFault,
    },

    #[error("{device}: {stage} stage failed: `{command}` exited with {}: {stderr}", exit_text(.code))]
    CommandFailure {
        device: DeviceIdentity,
        stage: Stage,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{device}: cancelled by user during {stage}")]
    Cancelled { device: DeviceIdentity, stage: Stage },
}

impl EraseError {
    pub fn device(&self) -> &DeviceIdentity {
        match self {
            EraseError::Configuration { device, .. }
            | EraseError::Device { device, .. }
            | EraseError::CommandFailure { device, .. }
            | EraseError::Cancelled { device, .. } => device,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            EraseError::Configuration { stage, .. }
            | EraseError::Device { stage, .. }
            | EraseError::CommandFailure { stage, .. }
            | EraseError::Cancelled { stage, .. } => *stage,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EraseError::Configuration { .. } => ErrorCategory::Configuration,
            EraseError::Device { .. } => ErrorCategory::Device,
            EraseError::CommandFailure { .. } => ErrorCategory::CommandFailure,
            EraseError::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Finer-grained kind used for the failure milestone
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            EraseError::Configuration { .. } => FailureKind::ToolNotFound,
            EraseError::CommandFailure { .. } => FailureKind::CommandFailed,
            EraseError::Device {
                fault: DeviceFault::PermissionDenied(_),
                ..
            } => FailureKind::PermissionDenied,
            EraseError::Device { .. } => FailureKind::OsError,
            EraseError::Cancelled { .. } => FailureKind::UserCancelled,
        }
    }

    /// Underlying cause without the device/stage prefix
    pub fn cause(&self) -> String {
        match self {
            EraseError::Configuration { tool, .. } => format!("required tool `{}` not found", tool),
            EraseError::Device { fault, .. } => fault.to_string(),
            EraseError::CommandFailure {
                command,
                code,
                stderr,
                ..
            } => format!("`{}` exited with {}: {}", command, exit_text(code), stderr),
            EraseError::Cancelled { .. } => "operation cancelled by user".to_string(),
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;

fn exit_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}
