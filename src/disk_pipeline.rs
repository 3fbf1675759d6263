// Disk Pipeline - erase, partition and format one device
//
// Drives a single device through
//
//   Inspecting -> Erasing -> Partitioning -> AwaitingSettle -> Formatting -> Logged -> Done
//
// with a terminal Failed(stage) or Cancelled reachable from any state. Stages
// run strictly in order; blocking device I/O and external tools run on the
// blocking pool so one slow disk never stalls the runtime. The stable identity
// is captured once while inspecting and used for every event and the log entry.

use crate::algorithms::{OverwriteEngine, OverwriteSummary, PassProgress};
use crate::config::EraserConfig;
use crate::drives::{Advisory, DeviceInspector, Formatter, Partitioner};
use crate::error::{DeviceFault, EraseError, StageError, StageResult};
use crate::events::{EventSink, FinishedAs, FleetEvent, MilestoneLevel, ProgressEvent};
use crate::io::open_exclusive;
use crate::operation_log::{OperationLog, OperationLogEntry};
use crate::tools::{CommandRunner, SystemRunner};
use crate::{strip_dev_prefix, DeviceIdentity, FilesystemKind, PassLabel, Stage};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared collaborators every pipeline stage is built from
#[derive(Clone)]
pub struct DiskToolkit {
    runner: Arc<dyn CommandRunner>,
    config: Arc<EraserConfig>,
}

impl DiskToolkit {
    pub fn new(runner: Arc<dyn CommandRunner>, config: EraserConfig) -> Self {
        Self {
            runner,
            config: Arc::new(config),
        }
    }

    /// Toolkit that runs the real system tools
    pub fn system(config: EraserConfig) -> Self {
        Self::new(Arc::new(SystemRunner), config)
    }

    pub fn config(&self) -> &EraserConfig {
        &self.config
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn inspector(&self) -> DeviceInspector {
        DeviceInspector::new(self.runner.clone(), self.config.clone())
    }

    pub fn partitioner(&self) -> Partitioner {
        Partitioner::new(self.runner.clone(), self.config.clone())
    }

    pub fn formatter(&self) -> Formatter {
        Formatter::new(self.runner.clone(), self.config.clone())
    }

    pub fn engine(&self) -> OverwriteEngine {
        OverwriteEngine::new(self.config.block_size)
    }

    /// Every external program a run with `filesystem` needs
    pub fn required_tools(filesystem: FilesystemKind) -> Vec<&'static str> {
        let mut tools = vec!["lsblk"];
        tools.extend(Partitioner::REQUIRED_TOOLS);
        tools.push(filesystem.mkfs_tool());
        tools
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Inspecting,
    Erasing,
    Partitioning,
    AwaitingSettle,
    Formatting,
    Logged,
    Done,
    Failed(Stage),
    Cancelled(Stage),
}

impl PipelineState {
    /// Stage a failure in this state is attributed to
    pub fn stage(&self) -> Stage {
        match self {
            PipelineState::Inspecting => Stage::Inspect,
            PipelineState::Erasing => Stage::Erase,
            PipelineState::Partitioning | PipelineState::AwaitingSettle => Stage::Partition,
            PipelineState::Formatting => Stage::Format,
            PipelineState::Logged | PipelineState::Done => Stage::Record,
            PipelineState::Failed(stage) | PipelineState::Cancelled(stage) => *stage,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Failed(_) | PipelineState::Cancelled(_)
        )
    }
}

/// When the pipeline entered a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateEntry {
    pub state: PipelineState,
    pub entered_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Success,
    Failed { stage: Stage, error: EraseError },
    Cancelled { stage: Stage },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success)
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Success => write!(f, "success"),
            PipelineOutcome::Failed { stage, error } => {
                write!(f, "failed at {} ({}): {}", stage, error.category(), error.cause())
            }
            PipelineOutcome::Cancelled { stage } => write!(f, "cancelled during {}", stage),
        }
    }
}

/// Everything one pipeline run produced
#[derive(Debug)]
pub struct PipelineReport {
    pub device_name: String,
    pub identity: DeviceIdentity,
    pub outcome: PipelineOutcome,
    pub trace: Vec<StateEntry>,
    pub advisories: Vec<Advisory>,
    pub overwrite: Option<OverwriteSummary>,
}

impl PipelineReport {
    /// Time the pipeline entered `state`, if it did
    pub fn entered(&self, state: PipelineState) -> Option<DateTime<Utc>> {
        self.trace.iter().find(|e| e.state == state).map(|e| e.entered_at)
    }

    pub fn final_state(&self) -> Option<PipelineState> {
        self.trace.last().map(|e| e.state)
    }
}

/// Forwards engine progress to the event sink at a byte granularity
///
/// The first block and the last block of every pass are always forwarded.
/// Forwarded events carry both the identity and the kernel name of the
/// device, so two devices with colliding identities stay distinguishable.
pub struct ProgressCoalescer {
    sink: EventSink,
    granularity: u64,
    device: DeviceIdentity,
    device_name: String,
    last: Option<(PassLabel, u64)>,
}

impl ProgressCoalescer {
    pub fn new(sink: EventSink, granularity: u64, device: DeviceIdentity, device_name: impl Into<String>) -> Self {
        Self {
            sink,
            granularity,
            device,
            device_name: device_name.into(),
            last: None,
        }
    }

    pub fn offer(&mut self, event: PassProgress) {
        let due = match self.last {
            Some((pass, sent)) if pass == event.pass => {
                self.granularity == 0
                    || event.bytes_written >= event.total_bytes
                    || event.bytes_written.saturating_sub(sent) >= self.granularity
            }
            _ => true,
        };
        if due {
            self.last = Some((event.pass, event.bytes_written));
            self.sink.progress(ProgressEvent {
                device: self.device.clone(),
                device_name: self.device_name.clone(),
                pass: event.pass,
                bytes_written: event.bytes_written,
                total_bytes: event.total_bytes,
            });
        }
    }
}

/// Per-run mutable state, owned by exactly one pipeline
struct RunState {
    name: String,
    identity: DeviceIdentity,
    state: PipelineState,
    trace: Vec<StateEntry>,
    advisories: Vec<Advisory>,
    overwrite: Option<OverwriteSummary>,
}

impl RunState {
    fn enter(&mut self, state: PipelineState) {
        self.state = state;
        self.trace.push(StateEntry {
            state,
            entered_at: Utc::now(),
        });
        tracing::debug!(device = %self.identity, name = %self.name, ?state, "Pipeline state");
    }
}

pub struct DiskPipeline {
    toolkit: DiskToolkit,
    log: OperationLog,
    events: EventSink,
    cancel: CancellationToken,
}

impl DiskPipeline {
    pub fn new(toolkit: DiskToolkit, log: OperationLog, events: EventSink, cancel: CancellationToken) -> Self {
        Self {
            toolkit,
            log,
            events,
            cancel,
        }
    }

    /// Run the whole pipeline for one device and report how it ended
    ///
    /// Never panics on device or tool failures: every failure becomes
    /// `PipelineOutcome::Failed` with the stage and the original cause.
    pub async fn run(self, device_name: &str, filesystem: FilesystemKind, passes: u32) -> PipelineReport {
        let name = strip_dev_prefix(device_name).to_string();
        let mut run = RunState {
            identity: DeviceIdentity::unknown(&name),
            name,
            state: PipelineState::Inspecting,
            trace: Vec::new(),
            advisories: Vec::new(),
            overwrite: None,
        };

        let outcome = match self.execute(&mut run, filesystem, passes).await {
            Ok(()) => PipelineOutcome::Success,
            Err(error) => self.terminate(&mut run, error),
        };

        let result = match &outcome {
            PipelineOutcome::Success => FinishedAs::Succeeded,
            PipelineOutcome::Failed { stage, .. } => FinishedAs::Failed(*stage),
            PipelineOutcome::Cancelled { .. } => FinishedAs::Cancelled,
        };
        self.events.emit(FleetEvent::Finished {
            device: run.identity.clone(),
            device_name: run.name.clone(),
            result,
        });

        PipelineReport {
            device_name: run.name,
            identity: run.identity,
            outcome,
            trace: run.trace,
            advisories: run.advisories,
            overwrite: run.overwrite,
        }
    }

    async fn execute(&self, run: &mut RunState, filesystem: FilesystemKind, passes: u32) -> Result<(), EraseError> {
        // Inspecting
        run.enter(PipelineState::Inspecting);
        self.checkpoint(run)?;
        let inspector = self.toolkit.inspector();
        let name = run.name.clone();
        match blocking(move || inspector.inspect(&name)).await {
            Ok(device) => {
                run.identity = device.identity.clone();
                run.advisories = Advisory::for_device(&device);
            }
            Err(err) => {
                let inspector = self.toolkit.inspector();
                let name = run.name.clone();
                if let Ok(identity) = tokio::task::spawn_blocking(move || inspector.identify(&name)).await {
                    run.identity = identity;
                }
                return Err(err.at(&run.identity, Stage::Inspect));
            }
        }
        self.milestone(run, MilestoneLevel::Info, format!("Processing disk identifier: {}", run.identity));
        for advisory in run.advisories.clone() {
            self.milestone(run, MilestoneLevel::Warning, advisory.to_string());
        }

        // Erasing
        run.enter(PipelineState::Erasing);
        self.checkpoint(run)?;
        if passes == 0 {
            let fault = DeviceFault::Unusable("at least one random pass is required".to_string());
            return Err(StageError::from(fault).at(&run.identity, Stage::Erase));
        }
        self.milestone(
            run,
            MilestoneLevel::Info,
            format!(
                "Erasing {} with {} random pass(es) and a final zero pass",
                run.identity, passes
            ),
        );
        let summary = self.erase(run, passes).await.map_err(|e| e.at(&run.identity, Stage::Erase))?;
        self.milestone(
            run,
            MilestoneLevel::Info,
            format!(
                "Erase completed on disk ID: {} ({} passes, {:.1} MB/s)",
                run.identity,
                summary.passes.len(),
                summary.throughput_mbps()
            ),
        );
        run.overwrite = Some(summary);

        // Partitioning
        run.enter(PipelineState::Partitioning);
        self.checkpoint(run)?;
        self.milestone(run, MilestoneLevel::Info, format!("Creating partition on disk ID: {}", run.identity));
        let partitioner = self.toolkit.partitioner();
        let name = run.name.clone();
        blocking(move || partitioner.partition(&name))
            .await
            .map_err(|e| e.at(&run.identity, Stage::Partition))?;

        // AwaitingSettle
        run.enter(PipelineState::AwaitingSettle);
        self.milestone(run, MilestoneLevel::Info, "Waiting for partition to be recognized...");
        self.toolkit
            .partitioner()
            .await_settle(&run.name, &self.cancel)
            .await
            .map_err(|e| e.at(&run.identity, Stage::Partition))?;

        // Formatting
        run.enter(PipelineState::Formatting);
        self.checkpoint(run)?;
        self.milestone(
            run,
            MilestoneLevel::Info,
            format!("Formatting disk ID: {} with {}", run.identity, filesystem),
        );
        let formatter = self.toolkit.formatter();
        let name = run.name.clone();
        blocking(move || formatter.format(&name, filesystem))
            .await
            .map_err(|e| e.at(&run.identity, Stage::Format))?;

        // Logged. The device is formatted, so the record is written even if a
        // cancellation arrived in the meantime.
        run.enter(PipelineState::Logged);
        let entry = OperationLogEntry::new(run.identity.clone(), filesystem, &run.name, passes);
        self.log
            .append(&entry)
            .map_err(|e| StageError::from(e).at(&run.identity, Stage::Record))?;

        run.enter(PipelineState::Done);
        self.milestone(run, MilestoneLevel::Info, format!("Completed operations on disk ID: {}", run.identity));
        Ok(())
    }

    /// Open the device exclusively and run the overwrite on the blocking pool
    async fn erase(&self, run: &RunState, passes: u32) -> StageResult<OverwriteSummary> {
        let path = self.toolkit.config().device_path(&run.name);
        let engine = self.toolkit.engine();
        let identity = run.identity.clone();
        let cancel = self.cancel.clone();
        let mut progress = ProgressCoalescer::new(
            self.events.clone(),
            self.toolkit.config().progress_granularity_bytes,
            identity.clone(),
            run.name.clone(),
        );

        blocking(move || {
            let mut device = open_exclusive(&path)?;
            engine.overwrite(&identity, &mut device, passes, &cancel, |event| progress.offer(event))
        })
        .await
    }

    /// Stop before starting a stage once cancellation was requested
    fn checkpoint(&self, run: &RunState) -> Result<(), EraseError> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled.at(&run.identity, run.state.stage()));
        }
        Ok(())
    }

    fn terminate(&self, run: &mut RunState, error: EraseError) -> PipelineOutcome {
        let stage = error.stage();
        match error {
            EraseError::Cancelled { .. } => {
                run.enter(PipelineState::Cancelled(stage));
                self.milestone(
                    run,
                    MilestoneLevel::Warning,
                    format!("Processing of disk {} interrupted by user during {}", run.identity, stage),
                );
                PipelineOutcome::Cancelled { stage }
            }
            error => {
                run.enter(PipelineState::Failed(stage));
                self.milestone(
                    run,
                    MilestoneLevel::Error,
                    format!(
                        "{} for disk {} during {}: {}",
                        capitalize(&error.failure_kind().to_string()),
                        run.identity,
                        stage,
                        error.cause()
                    ),
                );
                PipelineOutcome::Failed { stage, error }
            }
        }
    }

    fn milestone(&self, run: &RunState, level: MilestoneLevel, message: impl Into<String>) {
        self.events
            .milestone(&run.identity, Some(run.state.stage()), level, message);
    }
}

/// Run blocking work off the async runtime
async fn blocking<T, F>(work: F) -> StageResult<T>
where
    F: FnOnce() -> StageResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(DeviceFault::Io(io::Error::other(format!("stage task aborted: {}", e))).into()),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
