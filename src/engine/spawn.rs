//! Worker subprocess spawning.
//!
//! Workers are this same binary re-executed in the hidden `worker` mode via
//! `std::process::Command` (posix_spawn where available). Each one gets its
//! partition on stdin and its result channel wired in by the channel itself.
//!
//! The request is written from a short-lived feeder thread. A worker that
//! never drains stdin therefore cannot stall the spawn loop or keep the
//! timeout guard from being armed; once the worker exits or is killed the
//! write fails with `EPIPE` and the thread ends.

use super::channel::ResultChannel;
use super::ipc::PipeFd;
use super::proc::WorkerProcess;
use super::protocol::WorkRequest;
use crate::error::{EngineError, Result};
use std::io::{self, BufWriter, Write};
use std::os::unix::io::OwnedFd;
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};
use std::thread;

/// Subcommand that puts the binary into worker mode.
pub const WORKER_SUBCOMMAND: &str = "worker";

/// Resolve the program used for workers: an explicit override, or ourselves.
pub fn worker_program(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => std::env::current_exe().map_err(|e| {
            EngineError::Resource(format!("Failed to get current executable: {}", e))
        }),
    }
}

/// Spawn the worker for `channel`'s partition and hand it `request`.
///
/// On return the orchestrator no longer holds any worker-side end of the
/// channel. A worker that dies before reading its request is not an error
/// here; its partition will simply come back empty.
pub fn spawn_worker(
    program: &Path,
    channel: &mut dyn ResultChannel,
    request: &WorkRequest<'_>,
) -> Result<WorkerProcess> {
    let partition = channel.partition();
    let line = request.to_line()?;

    let mut cmd = Command::new(program);
    cmd.arg(WORKER_SUBCOMMAND);
    cmd.arg("--partition").arg(partition.to_string());
    channel.attach(&mut cmd)?;
    cmd.stdin(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    let mut child = cmd
        .spawn()
        .map_err(|source| EngineError::Spawn { partition, source })?;
    // The command still holds a duplicate of the channel's write end.
    drop(cmd);
    channel.seal();

    let stdin = child.stdin.take();
    let worker = WorkerProcess::from_child(partition, child);
    tracing::debug!(partition, pid = worker.pid().as_raw(), "Spawned worker");

    match stdin {
        Some(stdin) => feed_request(partition, stdin, line)?,
        None => tracing::warn!(partition, "Worker stdin not captured"),
    }

    Ok(worker)
}

/// Hand the request line to a detached feeder thread.
///
/// Failing to start the thread is a resource error; the caller drops the
/// worker, which kills and reaps it.
fn feed_request(partition: usize, stdin: ChildStdin, line: String) -> Result<()> {
    thread::Builder::new()
        .name(format!("pminmax-feed-{}", partition))
        .spawn(move || match send_request(OwnedFd::from(stdin), &line) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(partition, "Worker exited before reading its partition");
            }
            Err(e) => {
                tracing::warn!(partition, error = %e, "Worker did not accept its partition");
            }
        })
        .map(drop)
        .map_err(|e| EngineError::Resource(format!("Failed to start request feeder: {}", e)))
}

/// Write the request line and close stdin so the worker sees EOF.
fn send_request(stdin: OwnedFd, line: &str) -> io::Result<()> {
    let mut writer = BufWriter::new(PipeFd::new(stdin));
    writer.write_all(line.as_bytes())?;
    writer.flush()
}
