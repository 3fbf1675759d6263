// Multi-pass overwrite
//
// N random passes followed by exactly one zero pass over the whole device.
// Capacity is probed once by seeking to the end, then every pass restarts at
// offset 0 and writes fixed-size blocks, truncating the last one to the exact
// remaining byte count. Each pass is flushed to stable storage before the next
// one starts. There is no resume: a failed or cancelled pass leaves no record
// that it completed.

use super::{filler_for, pass_plan, BlockFill};
use crate::error::{DeviceFault, StageError, StageResult};
use crate::io::BlockTarget;
use crate::{DeviceIdentity, PassLabel};
use serde::Serialize;
use std::io::{Seek, SeekFrom, Write};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Cumulative bytes of the current pass, reported after every block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassProgress {
    pub pass: PassLabel,
    pub bytes_written: u64,
    pub total_bytes: u64,
}

/// What one completed pass wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub pass: PassLabel,
    pub bytes_written: u64,
    pub blocks: u64,
    /// Size of the last block, equal to the block size unless the capacity
    /// is not a multiple of it
    pub final_block_len: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverwriteSummary {
    pub capacity: u64,
    pub block_size: usize,
    pub passes: Vec<PassSummary>,
    #[serde(with = "human_duration")]
    pub elapsed: Duration,
}

impl OverwriteSummary {
    pub fn total_bytes(&self) -> u64 {
        self.passes.iter().map(|p| p.bytes_written).sum()
    }

    /// Average throughput across all passes in MB/s
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_bytes() as f64 / (1024.0 * 1024.0) / secs
    }
}

mod human_duration {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OverwriteEngine {
    block_size: usize,
}

impl Default for OverwriteEngine {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BLOCK_SIZE)
    }
}

impl OverwriteEngine {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    /// Overwrite the whole target with `random_passes` random passes and a
    /// final zero pass
    ///
    /// `on_progress` is called after every block with the cumulative bytes of
    /// the current pass. Cancellation is checked before each block, so a
    /// cancelled run stops on a block boundary. Callers guarantee
    /// `random_passes >= 1`.
    pub fn overwrite<T, F>(
        &self,
        device: &DeviceIdentity,
        target: &mut T,
        random_passes: u32,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> StageResult<OverwriteSummary>
    where
        T: BlockTarget + ?Sized,
        F: FnMut(PassProgress),
    {
        debug_assert!(random_passes >= 1);
        let started = Instant::now();

        let capacity = target.probe_capacity()?;
        if capacity == 0 {
            return Err(DeviceFault::Unusable(format!("{} reports zero capacity", device)).into());
        }
        tracing::debug!(
            device = %device,
            capacity,
            block_size = self.block_size,
            passes = random_passes + 1,
            "Starting overwrite"
        );

        let mut buffer = vec![0u8; self.block_size];
        let mut passes = Vec::with_capacity(random_passes as usize + 1);

        for pass in pass_plan(random_passes) {
            let mut fill = filler_for(pass);
            let summary = self.run_pass(
                device,
                target,
                capacity,
                pass,
                fill.as_mut(),
                &mut buffer,
                cancel,
                &mut on_progress,
            )?;
            tracing::debug!(device = %device, pass = %pass, blocks = summary.blocks, "Pass complete");
            passes.push(summary);
        }

        Ok(OverwriteSummary {
            capacity,
            block_size: self.block_size,
            passes,
            elapsed: started.elapsed(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pass<T, F>(
        &self,
        device: &DeviceIdentity,
        target: &mut T,
        capacity: u64,
        pass: PassLabel,
        fill: &mut dyn BlockFill,
        buffer: &mut [u8],
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> StageResult<PassSummary>
    where
        T: BlockTarget + ?Sized,
        F: FnMut(PassProgress),
    {
        target.seek(SeekFrom::Start(0))?;

        let mut written = 0u64;
        let mut blocks = 0u64;
        let mut final_block_len = 0usize;

        while written < capacity {
            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }

            let len = (capacity - written).min(self.block_size as u64) as usize;
            let block = &mut buffer[..len];
            fill.fill(block);
            target.write_all(block)?;

            written += len as u64;
            blocks += 1;
            final_block_len = len;

            on_progress(PassProgress {
                pass,
                bytes_written: written,
                total_bytes: capacity,
            });
        }

        target.sync()?;

        Ok(PassSummary {
            pass,
            bytes_written: written,
            blocks,
            final_block_len,
        })
    }
}
