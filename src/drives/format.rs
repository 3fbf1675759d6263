// Filesystem creation on the fresh partition

use crate::config::EraserConfig;
use crate::drives::partition::partition_node_name;
use crate::error::StageResult;
use crate::tools::CommandRunner;
use crate::FilesystemKind;
use std::sync::Arc;

pub struct Formatter {
    runner: Arc<dyn CommandRunner>,
    config: Arc<EraserConfig>,
}

impl Formatter {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<EraserConfig>) -> Self {
        Self { runner, config }
    }

    /// Create `filesystem` on the first partition of `device_name`
    ///
    /// The partition node is resolved with the same naming rule the
    /// partitioner uses.
    pub fn format(&self, device_name: &str, filesystem: FilesystemKind) -> StageResult<()> {
        let partition = self.config.device_dir.join(partition_node_name(device_name));
        let partition = partition.to_string_lossy();

        let mut args: Vec<&str> = filesystem.mkfs_args().to_vec();
        args.push(partition.as_ref());

        self.runner.run_checked(filesystem.mkfs_tool(), &args)?;
        tracing::debug!(partition = %partition, filesystem = %filesystem, "Filesystem created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::tools::{CommandOutput, ToolError};
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_with: Option<CommandOutput>,
    }

    impl CommandRunner for Recorder {
        fn locate(&self, program: &str) -> Result<PathBuf, ToolError> {
            Ok(PathBuf::from("/sbin").join(program))
        }

        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push(crate::tools::render_command(program, args));
            Ok(self.fail_with.clone().unwrap_or_else(|| CommandOutput::success("")))
        }
    }

    fn formatter(runner: Arc<Recorder>) -> Formatter {
        Formatter::new(runner, Arc::new(EraserConfig::default()))
    }

    #[test]
    fn test_mkfs_command_lines() {
        let runner = Arc::new(Recorder::default());
        let fmt = formatter(runner.clone());

        fmt.format("sda", FilesystemKind::Ext4).unwrap();
        fmt.format("/dev/nvme0n1", FilesystemKind::Ntfs).unwrap();
        fmt.format("sdc", FilesystemKind::Vfat).unwrap();

        assert_eq!(
            *runner.calls.lock().unwrap(),
            vec![
                "mkfs.ext4 -F /dev/sda1".to_string(),
                "mkfs.ntfs -f /dev/nvme0n1p1".to_string(),
                "mkfs.vfat -F 32 /dev/sdc1".to_string(),
            ]
        );
    }

    #[test]
    fn test_mkfs_failure_is_command_failure() {
        let runner = Arc::new(Recorder {
            fail_with: Some(CommandOutput::failure(1, "/dev/sdb1 is apparently in use by the system\n")),
            ..Default::default()
        });

        let err = formatter(runner).format("sdb", FilesystemKind::Ext4).unwrap_err();
        match err {
            StageError::CommandFailed { command, stderr, .. } => {
                assert_eq!(command, "mkfs.ext4 -F /dev/sdb1");
                assert!(stderr.ends_with("in use by the system"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
