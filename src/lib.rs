// Allow uppercase acronyms for industry-standard terms like GPT, SSD, NTFS
#![allow(clippy::upper_case_acronyms)]

pub mod algorithms;
pub mod config;
pub mod disk_pipeline;
pub mod drives;
pub mod error;
pub mod events;
pub mod fleet;
pub mod io;
pub mod logging;
pub mod operation_log;
pub mod tools;
pub mod ui;

// Re-export the pipeline and fleet entry points for convenience
pub use config::EraserConfig;
pub use disk_pipeline::{DiskPipeline, DiskToolkit, PipelineOutcome, PipelineReport, PipelineState};
pub use error::{DeviceFault, EraseError, ErrorCategory, ExitStatus, FailureKind, StageError};
pub use events::{EventSink, FleetEvent, MilestoneEvent, MilestoneLevel, ProgressEvent};
pub use fleet::{Fleet, FleetError, FleetReport, FleetRequest};
pub use operation_log::{OperationLog, OperationLogEntry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Stable, device-intrinsic identity string.
///
/// Cloned into every progress event, so it is reference counted rather than
/// copied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity(Arc<str>);

impl DeviceIdentity {
    pub fn new(identity: impl AsRef<str>) -> Self {
        Self(Arc::from(identity.as_ref()))
    }

    /// Identity used when neither a serial nor a model could be read
    pub fn unknown(device_name: &str) -> Self {
        Self::new(format!("unknown_{}", strip_dev_prefix(device_name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_synthesized(&self) -> bool {
        self.0.starts_with("unknown_")
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for DeviceIdentity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DeviceIdentity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

/// Strip a leading `/dev/` so `sda` and `/dev/sda` name the same device
pub fn strip_dev_prefix(device_name: &str) -> &str {
    device_name.strip_prefix("/dev/").unwrap_or(device_name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    Rotational,
    SolidState,
    Unknown,
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rotation::Rotational => write!(f, "HDD"),
            Rotation::SolidState => write!(f, "SSD"),
            Rotation::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountRole {
    Unmounted,
    ActiveRoot,
    LiveBootMedia,
    OtherMounted,
}

impl MountRole {
    /// Backs the running system (root filesystem or live boot media)
    pub fn is_active_system(&self) -> bool {
        matches!(self, MountRole::ActiveRoot | MountRole::LiveBootMedia)
    }
}

/// A device as seen by one pipeline run. Built fresh from a live inspection,
/// never cached between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Transient kernel name, e.g. `sda` or `nvme0n1`
    pub name: String,
    pub identity: DeviceIdentity,
    pub model: Option<String>,
    pub serial: Option<String>,
    /// Size reported by the inspection tool. The overwrite stage probes the
    /// real capacity itself.
    pub capacity_bytes: u64,
    pub rotation: Rotation,
    pub mount_role: MountRole,
}

impl Device {
    pub fn is_solid_state(&self) -> bool {
        self.rotation == Rotation::SolidState
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemKind {
    Ext4,
    Ntfs,
    Vfat,
}

impl FilesystemKind {
    pub const ALL: [FilesystemKind; 3] = [FilesystemKind::Ext4, FilesystemKind::Ntfs, FilesystemKind::Vfat];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilesystemKind::Ext4 => "ext4",
            FilesystemKind::Ntfs => "ntfs",
            FilesystemKind::Vfat => "vfat",
        }
    }

    /// Program that creates this filesystem
    pub fn mkfs_tool(&self) -> &'static str {
        match self {
            FilesystemKind::Ext4 => "mkfs.ext4",
            FilesystemKind::Ntfs => "mkfs.ntfs",
            FilesystemKind::Vfat => "mkfs.vfat",
        }
    }

    /// Arguments placed before the partition node
    pub fn mkfs_args(&self) -> &'static [&'static str] {
        match self {
            FilesystemKind::Ext4 => &["-F"],
            FilesystemKind::Ntfs => &["-f"],
            FilesystemKind::Vfat => &["-F", "32"],
        }
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported filesystem `{0}` (expected ext4, ntfs or vfat)")]
pub struct UnknownFilesystem(pub String);

impl FromStr for FilesystemKind {
    type Err = UnknownFilesystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ext4" => Ok(FilesystemKind::Ext4),
            "ntfs" => Ok(FilesystemKind::Ntfs),
            "vfat" => Ok(FilesystemKind::Vfat),
            _ => Err(UnknownFilesystem(s.to_string())),
        }
    }
}

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Inspect,
    Erase,
    Partition,
    Format,
    /// Appending the operation log entry after a successful format
    Record,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Inspect => "inspect",
            Stage::Erase => "erase",
            Stage::Partition => "partition",
            Stage::Format => "format",
            Stage::Record => "record",
        };
        f.write_str(name)
    }
}

/// Label of one overwrite pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassLabel {
    /// 1-based ordinal of a random pass
    Random(u32),
    FinalZero,
}

impl fmt::Display for PassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassLabel::Random(n) => write!(f, "pass {}", n),
            PassLabel::FinalZero => write!(f, "final-zero"),
        }
    }
}

#[cfg(test)]
mod lib_tests;
