/// Mock drive infrastructure for testing
///
/// Devices are plain files inside a temporary directory that stands in for
/// /dev, next to an empty sysfs tree and mount table. Files start filled with
/// a non-zero pattern to simulate a used drive.
use super::mock_commands::MockCommandRegistry;
use secure_disk_eraser::config::{SettleConfig, SettleStrategy};
use secure_disk_eraser::{DiskToolkit, EraserConfig, Fleet, OperationLog, OperationLogEntry};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Byte the mock drives are pre-filled with
pub const USED_PATTERN: u8 = 0xAB;

pub struct MockDevices {
    root: TempDir,
    pub runner: Arc<MockCommandRegistry>,
}

impl MockDevices {
    pub fn new() -> io::Result<Self> {
        let root = TempDir::new()?;
        fs::create_dir_all(root.path().join("dev"))?;
        fs::create_dir_all(root.path().join("sys/block"))?;
        fs::write(root.path().join("mounts"), "")?;

        let runner = Arc::new(MockCommandRegistry::new(&root.path().join("dev")));
        Ok(Self { root, runner })
    }

    pub fn dev_dir(&self) -> PathBuf {
        self.root.path().join("dev")
    }

    /// Create a used drive of `size_bytes`
    pub fn add(&self, name: &str, size_bytes: u64) -> io::Result<PathBuf> {
        let path = self.dev_dir().join(name);
        let mut file = File::create(&path)?;

        let chunk = vec![USED_PATTERN; 64 * 1024];
        let mut written = 0u64;
        while written < size_bytes {
            let len = (size_bytes - written).min(chunk.len() as u64) as usize;
            file.write_all(&chunk[..len])?;
            written += len as u64;
        }
        file.flush()?;
        Ok(path)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.path().join("state/erase_operations.log")
    }

    pub fn config(&self) -> EraserConfig {
        EraserConfig {
            block_size: 4096,
            progress_granularity_bytes: 0,
            settle: SettleConfig {
                strategy: SettleStrategy::Poll,
                timeout_ms: 5_000,
                poll_interval_ms: 10,
                fixed_delay_ms: 0,
            },
            operation_log: self.log_path(),
            device_dir: self.dev_dir(),
            sys_block_dir: self.root.path().join("sys/block"),
            mounts_path: self.root.path().join("mounts"),
            ..Default::default()
        }
    }

    pub fn toolkit(&self) -> DiskToolkit {
        DiskToolkit::new(self.runner.clone(), self.config())
    }

    pub fn fleet(&self) -> Fleet {
        Fleet::new(self.toolkit())
    }

    pub fn log_entries(&self) -> io::Result<Vec<OperationLogEntry>> {
        OperationLog::read_entries(self.log_path())
    }
}

/// True when every byte of the file is zero
pub fn is_all_zeros(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(true);
        }
        if buf[..n].iter().any(|&b| b != 0) {
            return Ok(false);
        }
    }
}

/// True when the file still holds only the pre-fill pattern
#[allow(dead_code)]
pub fn is_untouched(path: &Path) -> io::Result<bool> {
    Ok(fs::read(path)?.iter().all(|&b| b == USED_PATTERN))
}
