// Partitioning and settle wait
//
// A fresh GPT label, one partition spanning the whole device, then a kernel
// re-read. Node creation after `partprobe` is asynchronous, so the pipeline
// waits for the expected partition node before formatting.

use crate::config::{EraserConfig, SettleConfig, SettleStrategy};
use crate::error::{DeviceFault, StageError, StageResult};
use crate::strip_dev_prefix;
use crate::tools::CommandRunner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Name of the first partition node of a device
///
/// NVMe, MMC and loop devices (`nvme0n1`, `mmcblk0`, `loop0`) get a `p`
/// separator; everything else appends the ordinal directly.
pub fn partition_node_name(device_name: &str) -> String {
    let name = strip_dev_prefix(device_name);
    if name.contains("nvme") || name.starts_with("mmcblk") || name.starts_with("loop") {
        format!("{}p1", name)
    } else {
        format!("{}1", name)
    }
}

pub struct Partitioner {
    runner: Arc<dyn CommandRunner>,
    config: Arc<EraserConfig>,
}

impl Partitioner {
    /// Tools this stage shells out to
    pub const REQUIRED_TOOLS: [&'static str; 2] = ["parted", "partprobe"];

    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<EraserConfig>) -> Self {
        Self { runner, config }
    }

    /// Write a new GPT with a single 0%-100% partition and ask the kernel to
    /// re-read it
    ///
    /// No step is retried. A missing tool surfaces as `ToolMissing`, a tool
    /// that ran and failed as `CommandFailed`.
    pub fn partition(&self, device_name: &str) -> StageResult<()> {
        let device_path = self.config.device_path(device_name);
        let device = device_path.to_string_lossy();

        self.runner
            .run_checked("parted", &[device.as_ref(), "--script", "mklabel", "gpt"])?;
        self.runner.run_checked(
            "parted",
            &[device.as_ref(), "--script", "mkpart", "primary", "0%", "100%"],
        )?;
        self.runner.run_checked("partprobe", &[device.as_ref()])?;

        tracing::debug!(device = %device, "Partition table written");
        Ok(())
    }

    /// Path the kernel is expected to create for the new partition
    pub fn partition_path(&self, device_name: &str) -> PathBuf {
        self.config.device_dir.join(partition_node_name(device_name))
    }

    /// Wait until the partition node exists
    ///
    /// With the poll strategy a missing node after the timeout is a device
    /// error, never a silent continue.
    pub async fn await_settle(&self, device_name: &str, cancel: &CancellationToken) -> StageResult<PathBuf> {
        let node = self.partition_path(device_name);
        wait_for_node(&node, &self.config.settle, cancel).await?;
        Ok(node)
    }
}

/// Bounded wait for a device node
pub async fn wait_for_node(node: &Path, settle: &SettleConfig, cancel: &CancellationToken) -> StageResult<()> {
    match settle.strategy {
        SettleStrategy::FixedDelay => {
            tokio::select! {
                _ = cancel.cancelled() => Err(StageError::Cancelled),
                _ = tokio::time::sleep(settle.fixed_delay()) => Ok(()),
            }
        }
        SettleStrategy::Poll => {
            let started = Instant::now();
            loop {
                if node.exists() {
                    tracing::debug!(
                        node = %node.display(),
                        waited = %humantime::format_duration(round_ms(started.elapsed())),
                        "Partition node present"
                    );
                    return Ok(());
                }
                if started.elapsed() >= settle.timeout() {
                    return Err(DeviceFault::Timeout(format!(
                        "{} did not appear within {}",
                        node.display(),
                        humantime::format_duration(settle.timeout())
                    ))
                    .into());
                }
                tokio::select! {
                    _ = cancel.cancelled() => return Err(StageError::Cancelled),
                    _ = tokio::time::sleep(settle.poll_interval()) => {}
                }
            }
        }
    }
}

fn round_ms(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("sda", "sda1" ; "sata")]
    #[test_case("/dev/sdb", "sdb1" ; "dev prefix stripped")]
    #[test_case("nvme0n1", "nvme0n1p1" ; "nvme")]
    #[test_case("/dev/nvme1n2", "nvme1n2p1" ; "nvme with prefix")]
    #[test_case("mmcblk0", "mmcblk0p1" ; "mmc")]
    #[test_case("loop7", "loop7p1" ; "loop")]
    #[test_case("vda", "vda1" ; "virtio")]
    fn test_partition_node_name(device: &str, expected: &str) {
        assert_eq!(partition_node_name(device), expected);
    }

    fn poll(timeout_ms: u64) -> SettleConfig {
        SettleConfig {
            strategy: SettleStrategy::Poll,
            timeout_ms,
            poll_interval_ms: 10,
            fixed_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_wait_returns_once_node_appears() {
        let dir = TempDir::new().unwrap();
        let node = dir.path().join("sda1");
        let writer = node.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::write(writer, b"").unwrap();
        });

        wait_for_node(&node, &poll(5_000), &CancellationToken::new()).await.unwrap();
        assert!(node.exists());
    }

    #[tokio::test]
    async fn test_wait_times_out_as_device_error() {
        let dir = TempDir::new().unwrap();
        let err = wait_for_node(&dir.path().join("sdb1"), &poll(60), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Device(DeviceFault::Timeout(_))));
    }

    #[tokio::test]
    async fn test_wait_observes_cancellation() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = wait_for_node(&dir.path().join("sdc1"), &poll(5_000), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Cancelled));
    }

    #[tokio::test]
    async fn test_fixed_delay_does_not_check_node() {
        let settle = SettleConfig {
            strategy: SettleStrategy::FixedDelay,
            fixed_delay_ms: 10,
            ..poll(0)
        };
        wait_for_node(Path::new("/nonexistent/sdz1"), &settle, &CancellationToken::new())
            .await
            .unwrap();
    }
}
