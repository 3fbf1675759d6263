// Operation log
//
// Durable, append-only record of completed erase+format operations, one JSON
// object per line. Entries are keyed by the stable device identity captured at
// inspection time, never by the transient kernel name. Nothing in this crate
// rewrites or deletes a line.

use crate::{DeviceIdentity, FilesystemKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub timestamp: DateTime<Utc>,
    pub device: DeviceIdentity,
    pub filesystem: FilesystemKind,
    /// Kernel name at the time of the run, informational only
    pub device_name: String,
    /// Random passes performed before the final zero pass
    pub passes: u32,
}

impl OperationLogEntry {
    pub fn new(device: DeviceIdentity, filesystem: FilesystemKind, device_name: &str, passes: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            device,
            filesystem,
            device_name: crate::strip_dev_prefix(device_name).to_string(),
            passes,
        }
    }
}

/// Shared handle to the log file
///
/// Cloning shares the same file. Each append serializes the whole record and
/// writes it with a single call while holding the lock, so records from
/// concurrent pipelines never interleave.
#[derive(Debug, Clone)]
pub struct OperationLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl OperationLog {
    /// Open (creating if needed) the log for appending
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), "Operation log opened");

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &OperationLogEntry) -> io::Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("operation log lock poisoned"))?;
        file.write_all(&line)?;
        file.flush()?;

        tracing::info!(
            device = %entry.device,
            filesystem = %entry.filesystem,
            "Recorded completed operation"
        );
        Ok(())
    }

    /// Push everything to stable storage, called at the end of a fleet run
    pub fn flush(&self) -> io::Result<()> {
        let file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("operation log lock poisoned"))?;
        file.sync_all()
    }

    /// Read every record back. Lines that fail to parse are skipped.
    pub fn read_entries(path: impl AsRef<Path>) -> io::Result<Vec<OperationLogEntry>> {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed operation log line"),
            }
        }
        Ok(entries)
    }
}
