//! Host process backend.
//!
//! Spawns the program directly (no shell) in a fresh process group so a
//! timeout or output overflow can kill everything the program started.

use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use super::{CommandSpec, ExecutionBackend, ExecutionLimits, ProcessOutput};
use crate::error::BackendError;

const READ_CHUNK: usize = 8 * 1024;

/// Backend that runs programs directly on the host.
#[derive(Debug, Default, Clone)]
pub struct HostBackend {}

impl HostBackend {
    /// Create a new host backend.
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl ExecutionBackend for HostBackend {
    #[instrument(skip(self, stdin, limits), fields(program = %command.program, args = command.args.len()))]
    async fn execute(
        &self,
        command: &CommandSpec,
        stdin: &[u8],
        limits: &ExecutionLimits,
    ) -> Result<ProcessOutput, BackendError> {
        debug!(stdin_len = stdin.len(), "Spawning process");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BackendError::ToolNotFound(command.program.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        // The child is its own group leader, so its pid is the group id.
        let group = ProcessGroup {
            pgid: child.id().and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw),
        };

        let mut child_stdin = child.stdin.take().ok_or_else(|| pipe_error("stdin"))?;
        let mut child_stdout = child.stdout.take().ok_or_else(|| pipe_error("stdout"))?;
        let mut child_stderr = child.stderr.take().ok_or_else(|| pipe_error("stderr"))?;

        // Feed stdin from its own task: a program that never reads must not
        // block output capture. Dropping the handle closes the pipe (EOF).
        let input = stdin.to_vec();
        let feeder = tokio::spawn(async move {
            if let Err(e) = child_stdin.write_all(&input).await {
                if e.kind() != ErrorKind::BrokenPipe {
                    debug!(error = %e, "Failed to write stdin");
                }
            }
        });

        let capture = capture_output(
            &mut child_stdout,
            &mut child_stderr,
            limits.max_output_bytes,
        );

        let captured = match tokio::time::timeout_at(limits.deadline, capture).await {
            Ok(Ok(captured)) => captured,
            Ok(Err(e)) => {
                kill_group(&group, &mut child).await;
                feeder.abort();
                return Err(e.into());
            }
            Err(_) => {
                debug!("Deadline exceeded while reading output");
                kill_group(&group, &mut child).await;
                feeder.abort();
                return Err(BackendError::TimedOut);
            }
        };

        if captured.truncated {
            debug!(limit = limits.max_output_bytes, "Output ceiling reached, killing process group");
            kill_group(&group, &mut child).await;
        }

        let status = match tokio::time::timeout_at(limits.deadline, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                debug!("Deadline exceeded while waiting for exit");
                kill_group(&group, &mut child).await;
                feeder.abort();
                return Err(BackendError::TimedOut);
            }
        };
        feeder.abort();

        // Kills anything the program left running in its group.
        drop(group);

        let output = ProcessOutput {
            exit_code: status.code(),
            signal: status.signal(),
            stdout: String::from_utf8_lossy(&captured.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
            truncated: captured.truncated,
        };

        debug!(
            exit_code = ?output.exit_code,
            signal = ?output.signal,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "Process completed"
        );

        Ok(output)
    }
}

#[derive(Debug, Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    truncated: bool,
}

/// Read both streams concurrently until EOF, or until either exceeds `limit`.
async fn capture_output<O, E>(stdout: &mut O, stderr: &mut E, limit: usize) -> std::io::Result<Captured>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut out_chunk = vec![0u8; READ_CHUNK];
    let mut err_chunk = vec![0u8; READ_CHUNK];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_chunk), if out_open => {
                let n = read?;
                if n == 0 {
                    out_open = false;
                } else if !append_capped(&mut captured.stdout, &out_chunk[..n], limit) {
                    captured.truncated = true;
                    break;
                }
            }
            read = stderr.read(&mut err_chunk), if err_open => {
                let n = read?;
                if n == 0 {
                    err_open = false;
                } else if !append_capped(&mut captured.stderr, &err_chunk[..n], limit) {
                    captured.truncated = true;
                    break;
                }
            }
        }
    }

    Ok(captured)
}

/// Append as much of `chunk` as fits; returns false if anything was dropped.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    let room = limit.saturating_sub(buf.len());
    if chunk.len() <= room {
        buf.extend_from_slice(chunk);
        true
    } else {
        buf.extend_from_slice(&chunk[..room]);
        false
    }
}

/// The spawned process group. Dropping it SIGKILLs every member, so a
/// cancelled `execute` future cannot leave forked processes behind.
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn kill(&self) {
        let Some(pgid) = self.pgid else { return };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid = %pgid, error = %e, "Failed to kill process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// SIGKILL the whole group, then kill and reap the leader.
async fn kill_group(group: &ProcessGroup, child: &mut Child) {
    group.kill();
    let _ = child.kill().await;
}

fn pipe_error(name: &str) -> std::io::Error {
    std::io::Error::other(format!("Failed to open child {name}"))
}
