// Fleet Coordinator - one pipeline per selected device, run concurrently
//
// Each device gets its own tokio task and its own failure domain: a failing
// or cancelled pipeline never stops its siblings. The coordinator waits for
// every pipeline to reach a terminal state and then aggregates the results.
// The operation log is opened once per run, shared by all pipelines and
// flushed when the last one finishes.

use crate::disk_pipeline::{DiskPipeline, DiskToolkit, PipelineOutcome, PipelineReport};
use crate::drives::Advisory;
use crate::error::{ErrorCategory, ExitStatus, FailureKind};
use crate::events::EventSink;
use crate::operation_log::OperationLog;
use crate::{strip_dev_prefix, DeviceIdentity, FilesystemKind, Stage};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What the caller selected. The core never re-prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetRequest {
    pub devices: Vec<String>,
    pub filesystem: FilesystemKind,
    /// Random passes before the final zero pass
    pub passes: u32,
}

/// Problems that stop the whole run before any device is touched
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("no devices selected")]
    NoDevices,

    #[error("device {0} selected more than once")]
    DuplicateDevice(String),

    #[error("pass count must be at least 1")]
    InvalidPassCount,

    #[error("required command(s) not found: {}", .0.join(", "))]
    MissingTools(Vec<String>),

    #[error("cannot open operation log {path}: {source}")]
    OperationLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FleetError {
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::Configuration
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SucceededDevice {
    pub device_name: String,
    pub identity: DeviceIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDevice {
    pub device_name: String,
    pub identity: DeviceIdentity,
    /// `None` only when the pipeline task itself died
    pub stage: Option<Stage>,
    pub category: ErrorCategory,
    pub kind: FailureKind,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelledDevice {
    pub device_name: String,
    pub identity: DeviceIdentity,
    pub stage: Stage,
}

/// Aggregate result of one fleet run
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub filesystem: FilesystemKind,
    pub passes: u32,
    pub succeeded: Vec<SucceededDevice>,
    pub failed: Vec<FailedDevice>,
    pub cancelled: Vec<CancelledDevice>,
    pub advisories: Vec<Advisory>,
    /// Cancellation was requested while the run was in flight
    pub interrupted: bool,
}

impl FleetReport {
    fn new(request: &FleetRequest) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            filesystem: request.filesystem,
            passes: request.passes,
            succeeded: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
            advisories: Vec::new(),
            interrupted: false,
        }
    }

    fn record(&mut self, report: PipelineReport) {
        self.advisories.extend(report.advisories);
        match report.outcome {
            PipelineOutcome::Success => self.succeeded.push(SucceededDevice {
                device_name: report.device_name,
                identity: report.identity,
            }),
            PipelineOutcome::Failed { stage, error } => self.failed.push(FailedDevice {
                device_name: report.device_name,
                identity: report.identity,
                stage: Some(stage),
                category: error.category(),
                kind: error.failure_kind(),
                cause: error.cause(),
            }),
            PipelineOutcome::Cancelled { stage } => self.cancelled.push(CancelledDevice {
                device_name: report.device_name,
                identity: report.identity,
                stage,
            }),
        }
    }

    /// (succeeded, failed, cancelled)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.succeeded.len(), self.failed.len(), self.cancelled.len())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Exit status for a CLI wrapper, most severe wins
    pub fn exit_status(&self) -> ExitStatus {
        let mut status = ExitStatus::Success;
        for failed in &self.failed {
            status = status.worst(if failed.category.is_run_fatal() {
                ExitStatus::Configuration
            } else {
                ExitStatus::DeviceFailures
            });
        }
        if self.interrupted || !self.cancelled.is_empty() {
            status = status.worst(ExitStatus::Interrupted);
        }
        status
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

pub struct Fleet {
    toolkit: DiskToolkit,
    log: Option<OperationLog>,
}

impl Fleet {
    /// Fleet that opens the configured operation log at the start of each run
    pub fn new(toolkit: DiskToolkit) -> Self {
        Self { toolkit, log: None }
    }

    /// Fleet writing to an already opened log
    pub fn with_operation_log(toolkit: DiskToolkit, log: OperationLog) -> Self {
        Self { toolkit, log: Some(log) }
    }

    /// Reject requests no pipeline should start on
    pub fn validate(&self, request: &FleetRequest) -> Result<(), FleetError> {
        if request.devices.is_empty() {
            return Err(FleetError::NoDevices);
        }
        if request.passes < 1 {
            return Err(FleetError::InvalidPassCount);
        }
        let mut seen = HashSet::new();
        for device in &request.devices {
            let name = strip_dev_prefix(device);
            if !seen.insert(name) {
                return Err(FleetError::DuplicateDevice(name.to_string()));
            }
        }
        Ok(())
    }

    /// Every tool the run needs must be installed before anything is touched
    pub fn preflight(&self, filesystem: FilesystemKind) -> Result<(), FleetError> {
        let missing: Vec<String> = DiskToolkit::required_tools(filesystem)
            .into_iter()
            .filter(|tool| self.toolkit.runner().locate(tool).is_err())
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            tracing::error!(tools = ?missing, "Required command(s) not found");
            Err(FleetError::MissingTools(missing))
        }
    }

    /// Safety warnings for the selected devices, meant to be shown before the
    /// caller confirms the run. Devices that cannot be inspected are skipped.
    pub async fn advisories(&self, devices: &[String]) -> Vec<Advisory> {
        let inspector = self.toolkit.inspector();
        let devices = devices.to_vec();
        let collected = tokio::task::spawn_blocking(move || {
            devices
                .iter()
                .flat_map(|name| match inspector.advisories(name) {
                    Ok(advisories) => advisories,
                    Err(e) => {
                        tracing::debug!(name = %name, error = %e, "Skipping advisories");
                        Vec::new()
                    }
                })
                .collect::<Vec<_>>()
        })
        .await;

        collected.unwrap_or_default()
    }

    /// Run one pipeline per device concurrently and wait for all of them
    ///
    /// Progress sent to `events` is coalesced per device and pass to one event
    /// every `progress_granularity_bytes` (0 forwards every block). The first
    /// and the last block of a pass are always sent.
    ///
    /// Only request validation, tool preflight and opening the operation log
    /// can fail the call itself. Per-device failures land in the report.
    pub async fn run(
        &self,
        request: FleetRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<FleetReport, FleetError> {
        self.validate(&request)?;
        self.preflight(request.filesystem)?;

        let log = match &self.log {
            Some(log) => log.clone(),
            None => {
                let path = self.toolkit.config().operation_log.clone();
                OperationLog::open(&path).map_err(|source| FleetError::OperationLog { path, source })?
            }
        };

        let mut report = FleetReport::new(&request);
        tracing::info!(
            run_id = %report.run_id,
            devices = request.devices.len(),
            filesystem = %request.filesystem,
            passes = request.passes,
            "Starting fleet run"
        );

        let names: Vec<String> = request
            .devices
            .iter()
            .map(|d| strip_dev_prefix(d).to_string())
            .collect();
        let handles = names.iter().map(|name| {
            let pipeline = DiskPipeline::new(self.toolkit.clone(), log.clone(), events.clone(), cancel.clone());
            let name = name.clone();
            let (filesystem, passes) = (request.filesystem, request.passes);
            tokio::spawn(async move { pipeline.run(&name, filesystem, passes).await })
        });

        let results = futures::future::join_all(handles).await;
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(pipeline_report) => report.record(pipeline_report),
                Err(e) => {
                    tracing::error!(name = %name, error = %e, "Pipeline task aborted");
                    report.failed.push(FailedDevice {
                        identity: DeviceIdentity::unknown(&name),
                        device_name: name,
                        stage: None,
                        category: ErrorCategory::Device,
                        kind: FailureKind::OsError,
                        cause: format!("pipeline task aborted: {}", e),
                    });
                }
            }
        }

        if let Err(e) = log.flush() {
            tracing::warn!(path = %log.path().display(), error = %e, "Failed to flush operation log");
        }

        report.finished_at = Utc::now();
        report.interrupted = cancel.is_cancelled();

        let (succeeded, failed, cancelled) = report.counts();
        tracing::info!(
            run_id = %report.run_id,
            succeeded,
            failed,
            cancelled,
            "Fleet run finished"
        );
        for failure in &report.failed {
            tracing::error!(
                device = %failure.identity,
                stage = ?failure.stage,
                category = %failure.category,
                "{}",
                failure.cause
            );
        }

        Ok(report)
    }
}
