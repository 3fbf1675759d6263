// Structured logging setup
//
// Human-facing output (progress bars, milestones, the summary table) goes to
// the terminal through `ui`. Everything here is diagnostic: a stderr layer
// filtered by RUST_LOG, plus an optional plain-text file layer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "disk-eraser.log";

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Lower the default level to debug
    pub debug: bool,
    /// Also write diagnostics to `<dir>/disk-eraser.log`
    pub log_dir: Option<PathBuf>,
}

impl LoggingOptions {
    /// Filter for the terminal. Warnings only by default so bars stay readable.
    pub fn stderr_filter(&self) -> EnvFilter {
        self.env_filter(if self.debug { "debug" } else { "warn" })
    }

    /// Filter for the log file, which keeps every milestone
    pub fn file_filter(&self) -> EnvFilter {
        self.env_filter(if self.debug { "debug" } else { "info" })
    }

    /// RUST_LOG wins over the built-in default
    fn env_filter(&self, fallback: &str) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    }
}

/// Install the global subscriber
///
/// The returned guard must be kept alive for as long as file logging should
/// keep flushing. A log directory that cannot be created downgrades to
/// stderr-only logging with a warning.
pub fn init(options: &LoggingOptions) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(options.stderr_filter());

    let file = match options.log_dir.as_deref().map(file_writer) {
        Some(Ok(file)) => Some(file),
        Some(Err(e)) => {
            eprintln!("disk-eraser: failed to initialize file logging: {}", e);
            None
        }
        None => None,
    };

    match file {
        Some((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(options.file_filter());

            let _ = tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
            None
        }
    }
}

fn file_writer(dir: &Path) -> io::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    Ok(tracing_appender::non_blocking(appender))
}
