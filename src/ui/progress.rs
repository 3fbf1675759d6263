// Terminal progress for fleet runs
//
// Demultiplexes the fleet's event channel into one indicatif bar per device
// name. Identities can collide between look-alike drives without serials, so
// the kernel name keys the bars and the identity only labels them. Milestones are printed above the bars so they never tear a bar
// line. This is a consumer of the channel only; pipelines do not know it
// exists.

use crate::events::{FinishedAs, FleetEvent, MilestoneLevel};
use crate::DeviceIdentity;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedReceiver;

const BAR_TEMPLATE: &str =
    "{prefix:.bold} [{bar:40.green/240}] {percent:>3}% {bytes}/{total_bytes} {bytes_per_sec} ETA {eta} {msg}";

pub struct FleetProgress {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    style: ProgressStyle,
}

impl Default for FleetProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetProgress {
    /// Bars drawn on stderr
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Bars that are tracked but never drawn
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
            style,
        }
    }

    /// Consume events until every sender is gone
    pub async fn drain(mut self, mut rx: UnboundedReceiver<FleetEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(&event);
        }
        self.finish();
    }

    pub fn handle(&mut self, event: &FleetEvent) {
        match event {
            FleetEvent::Progress(progress) => {
                let bar = self.bar(&progress.device_name, &progress.device);
                if bar.length() != Some(progress.total_bytes) {
                    bar.set_length(progress.total_bytes);
                }
                bar.set_message(progress.pass.to_string());
                bar.set_position(progress.bytes_written);
            }
            FleetEvent::Milestone(milestone) => {
                let prefix = match milestone.level {
                    MilestoneLevel::Info => "",
                    MilestoneLevel::Warning => "⚠️  ",
                    MilestoneLevel::Error => "❌ ",
                };
                let _ = self.multi.println(format!("{}{}", prefix, milestone.message));
            }
            FleetEvent::Finished { device_name, result, .. } => {
                if let Some(bar) = self.bars.get(device_name) {
                    let message = match result {
                        FinishedAs::Succeeded => "done".to_string(),
                        FinishedAs::Failed(stage) => format!("failed during {}", stage),
                        FinishedAs::Cancelled => "cancelled".to_string(),
                    };
                    bar.abandon_with_message(message);
                }
            }
        }
    }

    /// Number of devices that have reported progress
    pub fn device_count(&self) -> usize {
        self.bars.len()
    }

    /// Current position of the bar for kernel name `device_name`
    pub fn position(&self, device_name: &str) -> Option<u64> {
        self.bars.get(device_name).map(|bar| bar.position())
    }

    pub fn is_finished(&self, device_name: &str) -> bool {
        self.bars.get(device_name).map(|bar| bar.is_finished()).unwrap_or(false)
    }

    fn finish(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }

    fn bar(&mut self, device_name: &str, identity: &DeviceIdentity) -> &ProgressBar {
        let multi = &self.multi;
        let style = &self.style;
        self.bars.entry(device_name.to_string()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_style(style.clone());
            bar.set_prefix(format!("{} ({})", device_name, identity));
            bar
        })
    }
}

/// Convert a byte count to a readable string
pub fn human_bytes(bytes: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0B".to_string();
    }
    let mut val = bytes as f64;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}
