use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secure_disk_eraser::drives::Advisory;
use secure_disk_eraser::logging::{self, LoggingOptions};
use secure_disk_eraser::ui::{human_bytes, FleetProgress};
use secure_disk_eraser::*;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "disk-eraser")]
#[command(about = "Erase, repartition and format disks, several at a time")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Disable the root privilege check (DANGEROUS!)
    #[arg(long, global = true)]
    unsafe_mode: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write diagnostics to <DIR>/disk-eraser.log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List disks that can be erased
    List,

    /// Erase, partition and format one or more disks concurrently
    Erase {
        /// Device names (e.g., sdb or /dev/sdb)
        #[arg(required = true)]
        devices: Vec<String>,

        /// Filesystem to create (ext4, ntfs, vfat)
        #[arg(short, long)]
        filesystem: FilesystemKind,

        /// Random passes before the final zero pass
        #[arg(short, long)]
        passes: Option<u32>,

        /// Skip the typed confirmation
        #[arg(long)]
        yes: bool,

        /// Erase devices that back the running system
        #[arg(long)]
        force: bool,

        /// Write the run report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let guard = logging::init(&LoggingOptions {
        debug: cli.debug,
        log_dir: cli.log_dir.clone(),
    });

    let cancel = CancellationToken::new();
    setup_signal_handlers(cancel.clone())?;

    // Check for root privileges
    if !cli.unsafe_mode && !is_root() {
        eprintln!("Error: This program requires root privileges.");
        eprintln!("Please run with sudo or as root user.");
        std::process::exit(1);
    }

    let status = run(cli, cancel).await?;

    // process::exit skips destructors, flush the file log first
    drop(guard);
    std::process::exit(status.code());
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<ExitStatus> {
    let config = match EraserConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitStatus::Configuration);
        }
    };
    let default_passes = config.default_passes;
    let toolkit = DiskToolkit::system(config);

    match cli.command {
        Commands::List => Ok(list_disks(&toolkit)),
        Commands::Erase {
            devices,
            filesystem,
            passes,
            yes,
            force,
            report_json,
        } => {
            let request = FleetRequest {
                devices,
                filesystem,
                passes: passes.unwrap_or(default_passes),
            };
            erase(Fleet::new(toolkit), request, yes, force, report_json, cancel).await
        }
    }
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn list_disks(toolkit: &DiskToolkit) -> ExitStatus {
    let inspector = toolkit.inspector();
    let disks = match inspector.list_disks() {
        Ok(disks) => disks,
        Err(e) => {
            eprintln!("Error: Failed to enumerate disks: {}", e);
            return e.exit_status();
        }
    };

    if disks.is_empty() {
        println!("No disks detected.");
        return ExitStatus::Success;
    }

    let active = inspector.active_system_devices();

    println!(
        "{:<12} {:<32} {:<10} {:<8} {:<8} {:<20}",
        "Device", "Identity", "Size", "Type", "Active", "Model"
    );
    println!("{}", "-".repeat(94));

    for disk in disks {
        let identity = inspector.identify(&disk.name);
        println!(
            "{:<12} {:<32} {:<10} {:<8} {:<8} {:<20}",
            disk.name,
            truncate_string(identity.as_str(), 32),
            human_bytes(disk.capacity_bytes),
            inspector.is_rotational(&disk.name).to_string(),
            if active.contains(&disk.name) { "yes" } else { "" },
            truncate_string(disk.model.as_deref().unwrap_or("-"), 20),
        );
    }

    if !active.is_empty() {
        println!("\n{} disk(s) back the running system and need --force to erase.", active.len());
    }

    ExitStatus::Success
}

async fn erase(
    fleet: Fleet,
    request: FleetRequest,
    yes: bool,
    force: bool,
    report_json: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<ExitStatus> {
    // Fail fast, before asking anybody to type anything
    if let Err(e) = fleet
        .validate(&request)
        .and_then(|_| fleet.preflight(request.filesystem))
    {
        eprintln!("Error: {}", e);
        return Ok(e.exit_status());
    }

    let advisories = fleet.advisories(&request.devices).await;
    for advisory in &advisories {
        eprintln!("{}", advisory);
    }

    let active: Vec<&Advisory> = advisories
        .iter()
        .filter(|a| matches!(a, Advisory::ActiveSystem { .. }))
        .collect();
    if !active.is_empty() && !force {
        eprintln!("Refusing to erase devices that back the running system. Use --force to override.");
        return Ok(ExitStatus::Configuration);
    }

    println!("The following disks will be erased and formatted as {}:", request.filesystem);
    for device in &request.devices {
        println!("  - {}", device);
    }
    println!(
        "{} random pass(es) followed by a zero pass.",
        request.passes
    );

    if !yes {
        println!("\n⚠ WARNING: This action is IRREVERSIBLE!");
        print!("Type 'ERASE' to confirm: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if input.trim() != "ERASE" {
            println!("Operation cancelled.");
            return Ok(ExitStatus::Success);
        }
    }

    let (events, rx) = EventSink::channel();
    let ui = tokio::spawn(FleetProgress::new().drain(rx));

    let result = fleet.run(request, events, cancel).await;
    // Every sender is gone once the run returns
    if let Err(e) = ui.await {
        tracing::warn!(error = %e, "Progress display task failed");
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(e.exit_status());
        }
    };

    print_summary(&report);

    if let Some(path) = report_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report saved to: {}", path.display());
    }

    Ok(report.exit_status())
}

fn print_summary(report: &FleetReport) {
    println!("\n{}", "=".repeat(80));
    println!(
        "{:<12} {:<32} {:<10} {:<10} {}",
        "Device", "Identity", "Result", "Stage", "Detail"
    );
    println!("{}", "-".repeat(80));

    for ok in &report.succeeded {
        println!(
            "{:<12} {:<32} {:<10} {:<10} {}",
            ok.device_name,
            truncate_string(ok.identity.as_str(), 32),
            "done",
            "-",
            ""
        );
    }
    for failed in &report.failed {
        let stage = failed.stage.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<32} {:<10} {:<10} {}: {}",
            failed.device_name,
            truncate_string(failed.identity.as_str(), 32),
            "FAILED",
            stage,
            failed.category,
            failed.cause
        );
    }
    for cancelled in &report.cancelled {
        println!(
            "{:<12} {:<32} {:<10} {:<10} {}",
            cancelled.device_name,
            truncate_string(cancelled.identity.as_str(), 32),
            "cancelled",
            cancelled.stage,
            "interrupted by user"
        );
    }

    let (succeeded, failed, cancelled) = report.counts();
    let elapsed = report.duration().to_std().unwrap_or_default();
    println!("{}", "=".repeat(80));
    println!(
        "{} succeeded, {} failed, {} cancelled in {}",
        succeeded,
        failed,
        cancelled,
        humantime::format_duration(std::time::Duration::from_secs(elapsed.as_secs()))
    );
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

// Signal handler for graceful shutdown
fn setup_signal_handlers(cancel: CancellationToken) -> Result<()> {
    use signal_hook::{consts::SIGINT, iterator::Signals};

    let mut signals = Signals::new([SIGINT])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGINT {
                if cancel.is_cancelled() {
                    eprintln!("\nSecond interrupt, exiting immediately.");
                    std::process::exit(ExitStatus::Interrupted.code());
                }
                eprintln!("\n\nInterrupt received! Stopping all pipelines...");
                eprintln!("   Please wait for the current block to finish writing...");
                cancel.cancel();
            }
        }
    });

    Ok(())
}
