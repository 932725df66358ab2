//! Timeout guard and the cancellation context it acts on.
//!
//! The guard is a plain deadline, not a signal. The orchestrator's wait loop
//! checks it between poll rounds, and on expiry calls
//! [`CancellationContext::terminate_all`] on the set of workers it still
//! owns. Nothing here is global; the context is passed by reference.

use super::proc::WorkerProcess;
use super::signals::TerminationReason;
use crate::error::Result;
use std::time::{Duration, Instant};

/// How often live workers are polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Where an armed guard's countdown ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    Unarmed,
    At(Instant),
    /// Further out than the monotonic clock can represent.
    Unreachable,
}

/// Single-shot deadline measured in whole seconds.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    timeout: Option<Duration>,
    deadline: Deadline,
}

impl TimeoutGuard {
    /// A guard that fires `secs` seconds after [`arm`](Self::arm), or never
    /// when `secs` is `None`.
    pub fn new(secs: Option<u64>) -> Self {
        Self {
            timeout: secs.map(Duration::from_secs),
            deadline: Deadline::Unarmed,
        }
    }

    /// Start the countdown. Arming twice restarts it.
    pub fn arm(&mut self) {
        let Some(timeout) = self.timeout else {
            self.deadline = Deadline::Unarmed;
            return;
        };
        self.deadline = Instant::now()
            .checked_add(timeout)
            .map_or(Deadline::Unreachable, Deadline::At);
        tracing::debug!(
            timeout_secs = timeout.as_secs(),
            reachable = self.deadline != Deadline::Unreachable,
            "Timeout guard armed"
        );
    }

    /// Stop the countdown so it can no longer fire.
    pub fn disarm(&mut self) {
        if self.deadline != Deadline::Unarmed {
            self.deadline = Deadline::Unarmed;
            tracing::debug!("Timeout guard disarmed");
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.deadline != Deadline::Unarmed
    }

    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Deadline::At(d) => Instant::now() >= d,
            Deadline::Unarmed | Deadline::Unreachable => false,
        }
    }

    /// Time left before expiry; `None` when unarmed or when the deadline
    /// lies beyond the clock's range.
    pub fn remaining(&self) -> Option<Duration> {
        match self.deadline {
            Deadline::At(d) => Some(d.saturating_duration_since(Instant::now())),
            Deadline::Unarmed | Deadline::Unreachable => None,
        }
    }
}

/// What the wait loop woke up for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A worker exited and has been reaped.
    Exited {
        partition: usize,
        reason: TerminationReason,
    },
    /// The guard's deadline passed with workers still outstanding.
    Expired,
    /// Every tracked worker has been reaped.
    NoneLeft,
}

/// The set of workers still alive, owned by the orchestrator.
#[derive(Debug, Default)]
pub struct CancellationContext {
    live: Vec<WorkerProcess>,
}

impl CancellationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly spawned worker.
    pub fn track(&mut self, worker: WorkerProcess) {
        self.live.push(worker);
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    #[cfg(test)]
    pub fn pids(&self) -> Vec<nix::unistd::Pid> {
        self.live.iter().map(WorkerProcess::pid).collect()
    }

    /// Partitions whose workers are still tracked.
    pub fn live_partitions(&self) -> Vec<usize> {
        self.live.iter().map(WorkerProcess::partition).collect()
    }

    /// Block until a worker exits, the guard expires, or nobody is left.
    ///
    /// The deadline is checked before every poll round, so an already
    /// expired guard always reports [`WaitOutcome::Expired`] while workers
    /// remain tracked.
    pub fn wait_any(&mut self, guard: &TimeoutGuard) -> Result<WaitOutcome> {
        loop {
            if self.live.is_empty() {
                return Ok(WaitOutcome::NoneLeft);
            }
            if guard.is_expired() {
                return Ok(WaitOutcome::Expired);
            }

            for i in 0..self.live.len() {
                if let Some(reason) = self.live[i].try_wait()? {
                    let worker = self.live.swap_remove(i);
                    return Ok(WaitOutcome::Exited {
                        partition: worker.partition(),
                        reason,
                    });
                }
            }

            let nap = guard
                .remaining()
                .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));
            std::thread::sleep(nap);
        }
    }

    /// Force-kill every tracked worker, then reap them all.
    ///
    /// Returns how many workers were still tracked.
    pub fn terminate_all(&mut self) -> usize {
        let count = self.live.len();
        for worker in &self.live {
            if let Err(e) = worker.kill() {
                tracing::warn!(partition = worker.partition(), error = %e, "Kill failed");
            }
        }
        for mut worker in self.live.drain(..) {
            match worker.wait() {
                Ok(reason) => {
                    tracing::debug!(partition = worker.partition(), %reason, "Reaped cancelled worker")
                }
                Err(e) => {
                    tracing::warn!(partition = worker.partition(), error = %e, "Failed to reap worker")
                }
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn spawn(partition: usize, program: &str, args: &[&str]) -> WorkerProcess {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .expect("Failed to spawn test process");
        WorkerProcess::from_child(partition, child)
    }

    #[test]
    fn test_unarmed_guard_never_expires() {
        let guard = TimeoutGuard::new(Some(0));
        assert!(!guard.is_armed());
        assert!(!guard.is_expired());
        assert_eq!(guard.remaining(), None);
    }

    #[test]
    fn test_zero_timeout_expires_immediately() {
        let mut guard = TimeoutGuard::new(Some(0));
        guard.arm();
        assert!(guard.is_expired());
        assert_eq!(guard.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_no_timeout_is_never_armed() {
        let mut guard = TimeoutGuard::new(None);
        guard.arm();
        assert!(!guard.is_armed());
        assert!(!guard.is_expired());
    }

    #[test]
    fn test_huge_timeout_is_armed_but_never_expires() {
        let mut guard = TimeoutGuard::new(Some(u64::MAX));
        guard.arm();
        assert!(guard.is_armed());
        assert!(!guard.is_expired());

        let mut ctx = CancellationContext::new();
        ctx.track(spawn(0, "true", &[]));
        assert!(matches!(
            ctx.wait_any(&guard).unwrap(),
            WaitOutcome::Exited { partition: 0, .. }
        ));
        guard.disarm();
        assert!(!guard.is_armed());
    }

    #[test]
    fn test_disarm() {
        let mut guard = TimeoutGuard::new(Some(0));
        guard.arm();
        guard.disarm();
        assert!(!guard.is_expired());
    }

    #[test]
    fn test_wait_any_reports_exits_then_none_left() {
        let mut ctx = CancellationContext::new();
        ctx.track(spawn(0, "true", &[]));
        ctx.track(spawn(1, "sh", &["-c", "exit 2"]));
        let guard = TimeoutGuard::new(None);

        let mut seen = Vec::new();
        loop {
            match ctx.wait_any(&guard).unwrap() {
                WaitOutcome::Exited { partition, reason } => seen.push((partition, reason)),
                WaitOutcome::NoneLeft => break,
                WaitOutcome::Expired => panic!("unarmed guard expired"),
            }
        }
        seen.sort_by_key(|(p, _)| *p);
        assert_eq!(
            seen,
            vec![
                (0, TerminationReason::Exited(0)),
                (1, TerminationReason::Exited(2))
            ]
        );
    }

    #[test]
    fn test_expired_guard_wins_over_running_workers() {
        let mut ctx = CancellationContext::new();
        ctx.track(spawn(0, "sleep", &["60"]));
        ctx.track(spawn(1, "sleep", &["60"]));
        let mut guard = TimeoutGuard::new(Some(0));
        guard.arm();

        assert_eq!(ctx.wait_any(&guard).unwrap(), WaitOutcome::Expired);
        assert_eq!(ctx.terminate_all(), 2);
        assert!(ctx.is_empty());
        assert_eq!(ctx.wait_any(&guard).unwrap(), WaitOutcome::NoneLeft);
    }

    #[test]
    fn test_terminate_all_handles_already_exited_workers() {
        let mut ctx = CancellationContext::new();
        ctx.track(spawn(0, "true", &[]));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(ctx.live_partitions(), vec![0]);
        assert_eq!(ctx.terminate_all(), 1);
        assert!(ctx.is_empty());
    }
}
