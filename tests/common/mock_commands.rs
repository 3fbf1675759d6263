/// Mock command execution infrastructure for testing
///
/// Stands in for lsblk, parted, partprobe and mkfs.* without running them.
/// Every invocation is recorded, failures are scripted per program and
/// device, and partprobe creates the partition node the way udev would.
use secure_disk_eraser::drives::partition_node_name;
use secure_disk_eraser::tools::{render_command, CommandOutput, CommandRunner, ToolError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Mock command registry
pub struct MockCommandRegistry {
    dev_dir: PathBuf,
    calls: Mutex<Vec<String>>,
    missing: Mutex<HashSet<String>>,
    /// Scripted failures keyed by program and whole-disk name
    failures: Mutex<HashMap<(String, String), CommandOutput>>,
    serials: Mutex<HashMap<String, String>>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl MockCommandRegistry {
    pub fn new(dev_dir: &Path) -> Self {
        Self {
            dev_dir: dev_dir.to_path_buf(),
            calls: Mutex::new(Vec::new()),
            missing: Mutex::new(HashSet::new()),
            failures: Mutex::new(HashMap::new()),
            serials: Mutex::new(HashMap::new()),
            cancel_on: Mutex::new(None),
        }
    }

    /// Make `program` fail with `output` when run against `device` or its
    /// first partition
    pub fn register_failure(&self, program: &str, device: &str, output: CommandOutput) {
        self.failures
            .lock()
            .unwrap()
            .insert((program.to_string(), device.to_string()), output);
    }

    fn scripted_failure(&self, program: &str, target: &str) -> Option<CommandOutput> {
        self.failures
            .lock()
            .unwrap()
            .iter()
            .find(|((p, device), _)| p == program && (target == device || target == partition_node_name(device)))
            .map(|(_, output)| output.clone())
    }

    /// Pretend `program` is not installed
    #[allow(dead_code)]
    pub fn remove_tool(&self, program: &str) {
        self.missing.lock().unwrap().insert(program.to_string());
    }

    /// Serial number lsblk reports for `device`
    #[allow(dead_code)]
    pub fn set_serial(&self, device: &str, serial: &str) {
        self.serials
            .lock()
            .unwrap()
            .insert(device.to_string(), serial.to_string());
    }

    /// Cancel `token` the first time `program` runs
    #[allow(dead_code)]
    pub fn cancel_on(&self, program: &str, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((program.to_string(), token));
    }

    /// Every command line run so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines with a path argument naming `device` or its partition
    pub fn calls_for(&self, device: &str) -> Vec<String> {
        let node = partition_node_name(device);
        self.calls()
            .into_iter()
            .filter(|call| {
                call.split_whitespace()
                    .filter(|arg| arg.contains('/'))
                    .filter_map(|arg| Path::new(arg).file_name().and_then(|n| n.to_str()))
                    .any(|target| target == device || target == node)
            })
            .collect()
    }

    fn lsblk_row(&self, target: &Path, name: &str) -> CommandOutput {
        let Ok(metadata) = fs::metadata(target) else {
            return CommandOutput::failure(32, format!("lsblk: {}: not a block device", target.display()));
        };
        let serial = self
            .serials
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("MOCK-{}", name));
        CommandOutput::success(format!(
            "NAME=\"{}\" SIZE=\"{}\" ROTA=\"1\" TYPE=\"disk\" SERIAL=\"{}\" MODEL=\"Mock Disk\"\n",
            name,
            metadata.len(),
            serial
        ))
    }
}

impl CommandRunner for MockCommandRegistry {
    fn locate(&self, program: &str) -> Result<PathBuf, ToolError> {
        if self.missing.lock().unwrap().contains(program) {
            return Err(ToolError::NotFound(program.to_string()));
        }
        Ok(PathBuf::from("/usr/sbin").join(program))
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError> {
        self.locate(program)?;
        self.calls.lock().unwrap().push(render_command(program, args));

        if let Some((trigger, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if trigger == program {
                token.cancel();
            }
        }

        let target = Path::new(args.iter().rev().find(|arg| arg.contains('/')).copied().unwrap_or_default());
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if let Some(output) = self.scripted_failure(program, &name) {
            return Ok(output);
        }

        match program {
            "lsblk" => Ok(self.lsblk_row(target, &name)),
            "partprobe" => {
                fs::write(self.dev_dir.join(partition_node_name(&name)), b"").unwrap();
                Ok(CommandOutput::success(""))
            }
            _ => Ok(CommandOutput::success("")),
        }
    }
}
