// Runtime configuration
//
// Layered with the `config` crate: built-in defaults, then an optional TOML
// file, then `DISK_ERASER__*` environment variables
// (e.g. `DISK_ERASER__SETTLE__TIMEOUT_MS=20000`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BLOCK_SIZE: usize = 4096;
pub const DEFAULT_PASSES: u32 = 5;
pub const OPERATION_LOG_FILE: &str = "erase_operations.log";
const ENV_PREFIX: &str = "DISK_ERASER";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraserConfig {
    /// Overwrite block size in bytes
    pub block_size: usize,
    /// Random passes used when the caller does not choose
    pub default_passes: u32,
    /// Minimum bytes between forwarded progress events, 0 forwards every block
    pub progress_granularity_bytes: u64,
    pub settle: SettleConfig,
    /// Append-only record of completed operations
    pub operation_log: PathBuf,
    /// Directory holding device nodes
    pub device_dir: PathBuf,
    /// sysfs directory with per-device `queue/rotational` attributes
    pub sys_block_dir: PathBuf,
    /// Mount table consulted for active system devices
    pub mounts_path: PathBuf,
    /// Mount point prefixes that identify live boot media
    pub live_media_prefixes: Vec<String>,
}

impl Default for EraserConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            default_passes: DEFAULT_PASSES,
            progress_granularity_bytes: 1024 * 1024,
            settle: SettleConfig::default(),
            operation_log: default_operation_log_path(),
            device_dir: PathBuf::from("/dev"),
            sys_block_dir: PathBuf::from("/sys/block"),
            mounts_path: PathBuf::from("/proc/mounts"),
            live_media_prefixes: vec!["/run/live".to_string()],
        }
    }
}

/// How the pipeline waits for the kernel to create the partition node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettleStrategy {
    /// Poll for the node until it appears or the timeout expires
    Poll,
    /// Sleep for `fixed_delay_ms` and continue
    FixedDelay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub strategy: SettleStrategy,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub fixed_delay_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            strategy: SettleStrategy::Poll,
            timeout_ms: 10_000,
            poll_interval_ms: 250,
            fixed_delay_ms: 5_000,
        }
    }
}

impl SettleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn fixed_delay(&self) -> Duration {
        Duration::from_millis(self.fixed_delay_ms)
    }
}

impl EraserConfig {
    /// Load defaults, then `path` (or the platform config file), then the
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let loaded: EraserConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be greater than zero".into()));
        }
        if self.default_passes == 0 {
            return Err(ConfigError::Invalid("default_passes must be at least 1".into()));
        }
        if self.settle.strategy == SettleStrategy::Poll && self.settle.timeout_ms == 0 {
            return Err(ConfigError::Invalid("settle.timeout_ms must be greater than zero".into()));
        }
        Ok(())
    }

    /// Path of a device node, e.g. `/dev/sda`
    pub fn device_path(&self, device_name: &str) -> PathBuf {
        self.device_dir.join(crate::strip_dev_prefix(device_name))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "secure-disk-eraser", "disk-eraser")
}

fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn default_operation_log_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_local_dir().join(OPERATION_LOG_FILE))
        .unwrap_or_else(|| PathBuf::from(OPERATION_LOG_FILE))
}
