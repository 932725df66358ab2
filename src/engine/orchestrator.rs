//! Run orchestration: plan, spawn, guard, wait, aggregate.
//!
//! ```text
//! INIT -> PARTITIONED -> SPAWNING -> RUNNING -> COMPLETED -> AGGREGATED -> DONE
//!                           |                 \-> TIMED_OUT -/
//!                           \-> ABORTED (spawn failure)
//! ```

use super::aggregate;
use super::channel::{ResultChannel, Transport, open_channels};
use super::guard::{CancellationContext, TimeoutGuard, WaitOutcome};
use super::partition::{self, Partition};
use super::protocol::WorkRequest;
use super::spawn::spawn_worker;
use crate::array::MinMax;
use crate::error::{EngineError, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Partitioned,
    Spawning,
    Running,
    Completed,
    TimedOut,
    Aggregated,
    Done,
    Aborted,
}

impl RunState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, Partitioned)
                | (Partitioned, Spawning)
                | (Spawning, Running)
                | (Spawning, Aborted)
                | (Running, Completed)
                | (Running, TimedOut)
                | (Completed, Aggregated)
                | (TimedOut, Aggregated)
                | (Aggregated, Done)
        )
    }
}

/// How the wait phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    TimedOut,
}

/// Engine settings for one run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Requested worker count (clamped to the array size).
    pub pnum: usize,
    /// Result transport shared by every partition.
    pub transport: Transport,
    /// Whole-second timeout; `None` disables the guard.
    pub timeout_secs: Option<u64>,
    /// Directory for file-transport artifacts.
    pub work_dir: PathBuf,
    /// Program re-executed in worker mode.
    pub worker_program: PathBuf,
    /// Per-worker artificial delay.
    pub worker_delay_ms: Option<u64>,
}

/// Everything the report needs about a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Global extrema, `None` when no partition contributed.
    pub result: Option<MinMax>,
    pub outcome: RunOutcome,
    pub partitions: usize,
    pub contributors: usize,
    pub transport: Transport,
    /// From the start of spawning to the last result read.
    pub elapsed: Duration,
}

impl RunReport {
    pub fn timed_out(&self) -> bool {
        self.outcome == RunOutcome::TimedOut
    }
}

/// Drives one statically partitioned min/max run.
pub struct Orchestrator {
    config: EngineConfig,
    state: RunState,
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: RunState::Init,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> RunState {
        self.state
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "Run state");
        self.state = next;
    }

    /// Run the whole job over `values`.
    ///
    /// Errors only for failures before or during spawning. Worker crashes,
    /// channel errors and timeouts degrade the result instead.
    #[instrument(skip_all, fields(size = values.len(), pnum = self.config.pnum, transport = %self.config.transport))]
    pub fn run(&mut self, values: &[i32]) -> Result<RunReport> {
        let partitions = partition::plan(values.len(), self.config.pnum)?;
        self.advance(RunState::Partitioned);

        let mut channels = open_channels(
            self.config.transport,
            partitions.len(),
            &self.config.work_dir,
        )?;

        self.advance(RunState::Spawning);
        let started = Instant::now();
        let mut live = CancellationContext::new();
        if let Err(e) = self.spawn_all(values, &partitions, &mut channels, &mut live) {
            return Err(self.abort(e, &mut live, channels));
        }

        let mut guard = TimeoutGuard::new(self.config.timeout_secs);
        guard.arm();
        self.advance(RunState::Running);

        let outcome = self.wait_all(&mut live, &guard)?;
        guard.disarm();
        self.advance(match outcome {
            RunOutcome::Completed => RunState::Completed,
            RunOutcome::TimedOut => RunState::TimedOut,
        });

        let partials = aggregate::collect(channels);
        let agg = aggregate::reduce(&partials);
        let elapsed = started.elapsed();
        self.advance(RunState::Aggregated);

        let report = RunReport {
            result: agg.result,
            outcome,
            partitions: partitions.len(),
            contributors: agg.contributors,
            transport: self.config.transport,
            elapsed,
        };
        info!(
            contributors = report.contributors,
            partitions = report.partitions,
            elapsed_ms = report.elapsed.as_millis() as u64,
            outcome = ?report.outcome,
            "Run finished"
        );
        self.advance(RunState::Done);
        Ok(report)
    }

    /// Spawn one worker per partition; stops at the first failure.
    fn spawn_all(
        &self,
        values: &[i32],
        partitions: &[Partition],
        channels: &mut [Box<dyn ResultChannel>],
        live: &mut CancellationContext,
    ) -> Result<()> {
        for (part, channel) in partitions.iter().zip(channels.iter_mut()) {
            let request = WorkRequest::new(part.index, &values[part.range()])
                .with_delay_ms(self.config.worker_delay_ms);
            let worker = spawn_worker(&self.config.worker_program, channel.as_mut(), &request)?;
            live.track(worker);
        }
        Ok(())
    }

    /// Tear down after a failed spawn loop: kill and reap every worker
    /// already started, release every channel, and end in `Aborted`.
    fn abort(
        &mut self,
        err: EngineError,
        live: &mut CancellationContext,
        channels: Vec<Box<dyn ResultChannel>>,
    ) -> EngineError {
        let killed = live.terminate_all();
        warn!(killed, error = %err, "Spawn failed, aborting run");
        drop(channels);
        self.advance(RunState::Aborted);
        err
    }

    /// Reap workers until none are left or the guard fires.
    fn wait_all(
        &self,
        live: &mut CancellationContext,
        guard: &TimeoutGuard,
    ) -> Result<RunOutcome> {
        loop {
            match live.wait_any(guard) {
                Ok(WaitOutcome::Exited { partition, reason }) => {
                    if reason.is_success() {
                        debug!(partition, "Worker finished");
                    } else {
                        warn!(partition, %reason, "Worker did not finish cleanly");
                    }
                }
                Ok(WaitOutcome::NoneLeft) => return Ok(RunOutcome::Completed),
                Ok(WaitOutcome::Expired) => {
                    let outstanding = live.live_partitions();
                    warn!(?outstanding, "Timeout reached, killing outstanding workers");
                    live.terminate_all();
                    return Ok(RunOutcome::TimedOut);
                }
                Err(e) => {
                    // Leave nothing running behind a failed wait.
                    live.terminate_all();
                    return Err(e);
                }
            }
        }
    }
}
