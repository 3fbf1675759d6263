// Events emitted by running pipelines
//
// Pipelines never call into a presentation layer. They push typed events onto
// an unbounded channel and whoever holds the receiver (a terminal UI, a test,
// nothing at all) consumes them at its own pace.

use crate::{DeviceIdentity, PassLabel, Stage};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Block-level overwrite progress. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub device: DeviceIdentity,
    /// Kernel name, unique within a run even when identities collide
    pub device_name: String,
    pub pass: PassLabel,
    pub bytes_written: u64,
    pub total_bytes: u64,
}

impl ProgressEvent {
    /// Completed fraction of the current pass, 0.0..=100.0
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_written as f64 / self.total_bytes as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MilestoneLevel {
    Info,
    Warning,
    Error,
}

/// Stage-boundary message, low frequency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneEvent {
    pub device: DeviceIdentity,
    pub stage: Option<Stage>,
    pub level: MilestoneLevel,
    pub message: String,
}

/// Terminal state announced once per device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishedAs {
    Succeeded,
    Failed(Stage),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FleetEvent {
    Progress(ProgressEvent),
    Milestone(MilestoneEvent),
    Finished {
        device: DeviceIdentity,
        device_name: String,
        result: FinishedAs,
    },
}

impl FleetEvent {
    pub fn device(&self) -> &DeviceIdentity {
        match self {
            FleetEvent::Progress(event) => &event.device,
            FleetEvent::Milestone(event) => &event.device,
            FleetEvent::Finished { device, .. } => device,
        }
    }
}

/// Sending half handed to every pipeline
///
/// Emitting never blocks and never fails: a dropped receiver only means
/// nobody is listening.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<FleetEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<FleetEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Create a sink together with the receiver that drains it
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FleetEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Sink that drops every event
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: FleetEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn progress(&self, event: ProgressEvent) {
        self.emit(FleetEvent::Progress(event));
    }

    /// Emit a milestone and mirror it to the structured log
    pub fn milestone(
        &self,
        device: &DeviceIdentity,
        stage: Option<Stage>,
        level: MilestoneLevel,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match level {
            MilestoneLevel::Info => tracing::info!(device = %device, "{}", message),
            MilestoneLevel::Warning => tracing::warn!(device = %device, "{}", message),
            MilestoneLevel::Error => tracing::error!(device = %device, "{}", message),
        }
        self.emit(FleetEvent::Milestone(MilestoneEvent {
            device: device.clone(),
            stage,
            level,
            message,
        }));
    }
}
