//! One execution of a job's child process, start to reap.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use procman_types::{JobDescriptor, JobState};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStdout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::process;
use crate::state::StateCell;

/// How one runner attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// fork/exec failed or the executable was not found.
    StartFailed,
    /// The child exited on its own with this code.
    Exited(i32),
    /// The cancel token fired; the child was signalled and reaped.
    Cancelled,
}

/// Log file path for one runner attempt: `<root>/<job>/<unix-nanos>.log`.
#[must_use]
pub fn attempt_log_path(logs_root: &Path, job_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    logs_root.join(job_name).join(format!("{nanos}.log"))
}

/// Launches the descriptor's command, streaming child stdout to `log_path`
/// (truncating an existing file). Returns when the child exits on its own or
/// `cancel` fires; in the latter case the child receives SIGTERM and is
/// reaped before this function returns. There is no SIGKILL escalation: a
/// child that ignores SIGTERM blocks the caller indefinitely.
///
/// # Errors
///
/// `Err` is reserved for environment failures (log file create/write); start
/// failures are reported as [`RunOutcome::StartFailed`].
pub async fn run(
    descriptor: &JobDescriptor,
    log_path: &Path,
    state: &StateCell,
    cancel: &CancellationToken,
) -> Result<RunOutcome> {
    let tokens = descriptor.command_tokens();
    if tokens.is_empty() || tokens[0].is_empty() {
        warn!(job = %descriptor.name, "empty command, nothing to start");
        return Ok(RunOutcome::StartFailed);
    }

    info!(job = %descriptor.name, command = %descriptor.command, "starting job");
    let spawned = match process::spawn(&tokens) {
        Ok(spawned) => spawned,
        Err(err) => {
            warn!(job = %descriptor.name, error = %err, "failed to start job");
            return Ok(RunOutcome::StartFailed);
        }
    };
    let process::Spawned {
        mut child,
        pgid,
        stdout,
    } = spawned;

    state.set(JobState::Running);
    info!(job = %descriptor.name, pgid, "job is running");

    let sink = match File::create(log_path).await {
        Ok(sink) => sink,
        Err(err) => {
            // Don't leak the child when the log sink cannot be opened.
            let _ = process::terminate(pgid);
            let _ = child.wait().await;
            return Err(Error::Io(err));
        }
    };
    let pump = tokio::spawn(pump_stdout(stdout, sink));

    let outcome = tokio::select! {
        status = child.wait() => {
            let code = status?.code().unwrap_or_default();
            info!(job = %descriptor.name, code, "job finished");
            RunOutcome::Exited(code)
        }
        () = cancel.cancelled() => {
            info!(job = %descriptor.name, "stopping job");
            if let Err(err) = process::terminate(pgid) {
                warn!(job = %descriptor.name, error = %err, "failed to signal job");
            }
            let _ = child.wait().await;
            info!(job = %descriptor.name, "job stopped");
            RunOutcome::Cancelled
        }
    };

    // The pump drains to EOF once the child is gone; joining it here is what
    // guarantees every line reached the log file.
    match pump.await {
        Ok(Ok(())) => Ok(outcome),
        Ok(Err(err)) => Err(Error::Io(err)),
        Err(err) => Err(Error::Io(std::io::Error::other(err))),
    }
}

/// Copies child stdout to the log sink, one line at a time, each line
/// terminated by exactly one newline.
async fn pump_stdout(stdout: ChildStdout, mut sink: File) -> std::io::Result<()> {
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            break;
        }
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        sink.write_all(&line).await?;
    }
    sink.flush().await
}
