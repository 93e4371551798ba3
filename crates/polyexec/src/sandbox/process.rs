//! Process spawning and I/O
//!
//! Runs a [`SandboxCommand`] to completion or until its deadline, capturing
//! stdout and stderr and killing the whole process group afterwards.

use std::os::unix::process::ExitStatusExt;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

use crate::sandbox::SandboxError;
use crate::sandbox::command::SandboxCommand;

/// How long to keep draining pipes once the process group is gone
const READER_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8 * 1024;

/// Captured result of a finished child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,

    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,

    /// Terminating signal, if the process was killed by one
    pub signal: Option<i32>,

    /// Whether the deadline was hit
    pub timed_out: bool,

    /// Wall time from spawn until the process group was reaped
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Exited on its own with status zero
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Kills a process group when dropped
///
/// Guards against leaking descendants if the owning future is cancelled.
#[derive(Debug)]
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid
                .and_then(|pid| i32::try_from(pid).ok())
                .map(Pid::from_raw),
        }
    }

    /// Send SIGKILL to every member; later calls are no-ops
    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) => debug!(%pgid, "killed process group"),
            Err(Errno::ESRCH) => {}
            Err(e) => warn!(%pgid, error = %e, "failed to kill process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Run a command, feeding it `stdin` and capturing its output
///
/// Stdin is closed immediately when no input is given. Output beyond the
/// command's limit is read and discarded so the child never blocks on a full
/// pipe. When the deadline passes the process group is killed and the partial
/// output is returned with `timed_out` set.
#[instrument(skip(command, stdin), fields(program = command.program()))]
pub async fn run(
    command: &SandboxCommand,
    stdin: Option<&[u8]>,
) -> Result<ProcessOutput, SandboxError> {
    let stdin = stdin.filter(|data| !data.is_empty());
    let program = command.program().unwrap_or_default().to_owned();

    let mut child = command
        .build(stdin.is_some())?
        .spawn()
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => SandboxError::CommandNotFound(program.clone()),
            _ => SandboxError::SpawnFailed {
                program: program.clone(),
                source,
            },
        })?;
    let started = Instant::now();
    let mut group = ProcessGroup::new(child.id());
    debug!(pid = child.id(), args = ?command.argv(), "spawned child process");

    let writer = match (child.stdin.take(), stdin) {
        (Some(mut pipe), Some(data)) => {
            let data = data.to_vec();
            Some(tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&data).await {
                    debug!(error = %e, "child closed stdin before reading all input");
                }
            }))
        }
        _ => None,
    };

    let limit = command.output_limit();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let (status, timed_out) = {
        let streams = async {
            tokio::join!(
                read_capped(stdout_pipe, &mut stdout, limit),
                read_capped(stderr_pipe, &mut stderr, limit),
            )
        };
        tokio::pin!(streams);
        let mut streams_done = false;

        let waited = tokio::time::timeout(command.deadline(), async {
            loop {
                tokio::select! {
                    status = child.wait() => break status,
                    _ = &mut streams, if !streams_done => streams_done = true,
                }
            }
        })
        .await;

        let outcome = match waited {
            Ok(status) => (status?, false),
            Err(_) => {
                debug!(
                    timeout_ms = command.deadline().as_millis() as u64,
                    "deadline exceeded, killing process group"
                );
                group.kill();
                let _ = child.start_kill();
                (child.wait().await?, true)
            }
        };

        // Background descendants are killed even after a clean exit.
        group.kill();

        if !streams_done && tokio::time::timeout(READER_GRACE, &mut streams).await.is_err() {
            warn!("output pipes still open after the process group was killed, truncating");
        }

        outcome
    };

    if let Some(writer) = writer {
        writer.abort();
    }

    let output = ProcessOutput {
        stdout,
        stderr,
        exit_code: status.code(),
        signal: status.signal(),
        timed_out,
        elapsed: started.elapsed(),
    };

    debug!(
        exit_code = ?output.exit_code,
        signal = ?output.signal,
        timed_out,
        elapsed_ms = output.elapsed.as_millis() as u64,
        stdout_len = output.stdout.len(),
        stderr_len = output.stderr.len(),
        "process finished"
    );

    Ok(output)
}

/// Read a pipe to EOF, keeping at most `limit` bytes in `buf`
async fn read_capped<R>(reader: Option<R>, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };

    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let room = limit.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
}
