// External tool execution
//
// Every program the pipeline shells out to (lsblk, parted, partprobe, mkfs.*)
// goes through a `CommandRunner`. The runner is the one place that can tell a
// missing tool apart from a tool that ran and failed, which the error
// taxonomy depends on.

use crate::error::{StageError, StageResult};
use std::io;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

/// Captured result of one external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Seam for running external programs
pub trait CommandRunner: Send + Sync {
    /// Resolve a program to an executable path
    fn locate(&self, program: &str) -> Result<PathBuf, ToolError>;

    /// Run a program to completion and capture its output
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError>;

    /// Run a program and turn a non-zero exit into `StageError::CommandFailed`
    fn run_checked(&self, program: &str, args: &[&str]) -> StageResult<String> {
        let output = self.run(program, args)?;
        if output.is_success() {
            Ok(output.stdout)
        } else {
            Err(StageError::CommandFailed {
                command: render_command(program, args),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs real programs found on `PATH`
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn locate(&self, program: &str) -> Result<PathBuf, ToolError> {
        which::which(program).map_err(|_| ToolError::NotFound(program.to_string()))
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError> {
        let path = self.locate(program)?;
        tracing::debug!(command = %render_command(program, args), "Running");

        let output = Command::new(&path)
            .args(args)
            .output()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => ToolError::NotFound(program.to_string()),
                _ => ToolError::Spawn {
                    program: program.to_string(),
                    source,
                },
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Shell-style rendering of a command line for messages
pub fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
