//! Parallel min/max engine over isolated worker processes.
//!
//! The input is split into contiguous partitions, one worker subprocess per
//! partition. Each worker sends back a single (min, max) pair through a
//! result channel and exits; the orchestrator reaps them all (or kills the
//! stragglers once the timeout guard fires) and folds whatever came back.
//!
//! # Architecture
//!
//! ```text
//!                     ┌──────────────────┐
//!                     │   Orchestrator   │
//!                     │ plan/guard/reduce│
//!                     └────────┬─────────┘
//!               stdin: slice   │   channel: (min, max)
//!               ┌──────────────┼──────────────┐
//!               │              │              │
//!         ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!         │ Worker 0  │  │ Worker 1  │  │ Worker N  │
//!         │ (process) │  │ (process) │  │ (process) │
//!         └───────────┘  └───────────┘  └───────────┘
//! ```
//!
//! # Transports
//!
//! - **pipe**: binary pair on a dedicated pipe installed as the worker's stdout
//! - **file**: text pair in a per-partition artifact, removed after reading

mod aggregate;
mod channel;
mod guard;
mod ipc;
mod orchestrator;
mod partition;
mod proc;
mod protocol;
mod signals;
mod spawn;
mod worker_main;

pub use channel::Transport;
pub use orchestrator::{EngineConfig, Orchestrator, RunOutcome, RunReport};
pub use spawn::worker_program;
pub use worker_main::run_worker_main;
