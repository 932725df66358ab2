//! Process handle for worker subprocesses.

use super::signals::{TerminationReason, analyze_wait_status};
use crate::error::{EngineError, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

/// Handle to one spawned worker.
///
/// Owned by the orchestrator until the process is reaped. After that the pid
/// may be recycled by the OS, so every signalling method becomes a no-op.
#[derive(Debug)]
pub struct WorkerProcess {
    partition: usize,
    pid: Pid,
    reaped: bool,
}

impl WorkerProcess {
    pub fn new(partition: usize, pid: Pid) -> Self {
        Self {
            partition,
            pid,
            reaped: false,
        }
    }

    /// Adopt a spawned `std::process::Child`.
    ///
    /// Reaping is done through `waitpid`, so the `Child` itself is dropped.
    pub fn from_child(partition: usize, child: std::process::Child) -> Self {
        Self::new(partition, Pid::from_raw(child.id() as i32))
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[cfg(test)]
    pub fn is_reaped(&self) -> bool {
        self.reaped
    }

    /// Reap the process if it has exited (non-blocking).
    ///
    /// Returns `None` while the process is still running.
    pub fn try_wait(&mut self) -> Result<Option<TerminationReason>> {
        if self.reaped {
            return Err(EngineError::Worker(format!(
                "worker {} already reaped",
                self.partition
            )));
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => {
                self.reaped = true;
                Ok(Some(analyze_wait_status(status)))
            }
            Err(Errno::ECHILD) => {
                self.reaped = true;
                Ok(Some(TerminationReason::Unknown))
            }
            Err(e) => Err(EngineError::Worker(format!("waitpid failed: {}", e))),
        }
    }

    /// Wait for the process to exit (blocking).
    pub fn wait(&mut self) -> Result<TerminationReason> {
        if self.reaped {
            return Err(EngineError::Worker(format!(
                "worker {} already reaped",
                self.partition
            )));
        }
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    self.reaped = true;
                    return Ok(analyze_wait_status(status));
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    self.reaped = true;
                    return Ok(TerminationReason::Unknown);
                }
                Err(e) => return Err(EngineError::Worker(format!("waitpid failed: {}", e))),
            }
        }
    }

    /// Send SIGKILL without reaping.
    ///
    /// An already-exited (zombie) process still owns its pid, so this is safe
    /// until the handle is reaped.
    pub fn kill(&self) -> Result<()> {
        if self.reaped {
            return Ok(());
        }
        match signal::kill(self.pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(EngineError::Worker(format!("Failed to send SIGKILL: {}", e))),
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
            self.reaped = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};
    use std::time::Duration;

    fn spawn(program: &str, args: &[&str]) -> WorkerProcess {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .expect("Failed to spawn test process");
        WorkerProcess::from_child(0, child)
    }

    #[test]
    fn test_wait_normal_exit() {
        let mut proc = spawn("true", &[]);
        assert_eq!(proc.wait().unwrap(), TerminationReason::Exited(0));
        assert!(proc.is_reaped());
    }

    #[test]
    fn test_try_wait_running_then_killed() {
        let mut proc = spawn("sleep", &["60"]);
        assert_eq!(proc.try_wait().unwrap(), None);

        proc.kill().unwrap();
        assert_eq!(
            proc.wait().unwrap(),
            TerminationReason::Signaled(Signal::SIGKILL)
        );
    }

    #[test]
    fn test_signals_are_noops_after_reap() {
        let mut proc = spawn("true", &[]);
        proc.wait().unwrap();
        assert!(proc.kill().is_ok());
        assert!(proc.try_wait().is_err());
        assert!(proc.wait().is_err());
    }

    #[test]
    fn test_try_wait_eventually_reaps() {
        let mut proc = spawn("sh", &["-c", "exit 3"]);
        let reason = loop {
            if let Some(reason) = proc.try_wait().unwrap() {
                break reason;
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(reason, TerminationReason::Exited(3));
    }

    #[test]
    fn test_drop_kills_running_process() {
        let proc = spawn("sleep", &["60"]);
        let pid = proc.pid();
        drop(proc);
        // Reaped by drop, so the pid no longer refers to our child.
        assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
    }
}
