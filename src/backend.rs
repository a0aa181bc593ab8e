//! Process execution backend trait and implementations.
//!
//! Backends spawn a single program with piped stdio and enforce the
//! deadline and output ceiling. The runner chains compile and run steps on
//! top of this.

mod host;

pub use host::HostBackend;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::BackendError;

/// A program invocation. Arguments are passed as a vector; nothing goes
/// through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Limits applied to one process.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    /// Absolute deadline shared by every step of a pipeline.
    pub deadline: Instant,
    /// Maximum bytes kept per output stream.
    pub max_output_bytes: usize,
}

/// Captured result of a process that ran to completion (or was cut off for
/// exceeding the output ceiling).
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Output exceeded the ceiling and the process was killed.
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human-readable description of a non-zero termination.
    pub fn describe_exit(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("Process exited with code {code}"),
            (None, Some(signal)) => format!("Process terminated by signal {signal}"),
            (None, None) => "Process terminated abnormally".to_string(),
        }
    }
}

/// Trait for execution backends.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Spawn `command`, feed it `stdin`, and capture its output.
    ///
    /// Returns `BackendError::ToolNotFound` when the program does not exist and
    /// `BackendError::TimedOut` when `limits.deadline` passes first. In both
    /// the timeout and overflow cases the whole process group is killed
    /// before returning.
    async fn execute(
        &self,
        command: &CommandSpec,
        stdin: &[u8],
        limits: &ExecutionLimits,
    ) -> Result<ProcessOutput, BackendError>;
}
