//! Worker subprocess entry point.
//!
//! Runs when the binary is invoked as `pminmax worker`. Reads one
//! [`WorkRequest`] from stdin, scans it, publishes the pair through the
//! configured sink and exits.

use super::channel::ResultSink;
use super::protocol::WorkRequest;
use crate::array;
use crate::error::{EngineError, Result};
use nix::sys::signal::{SigHandler, Signal, signal};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Process one request from `input` and publish its result.
fn serve<R: BufRead, W: Write>(
    partition: usize,
    input: &mut R,
    sink: &ResultSink,
    stdout: &mut W,
) -> Result<()> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(EngineError::Worker("no request on stdin".into()));
    }
    let request = WorkRequest::from_line(&line)?;
    if request.partition != partition {
        return Err(EngineError::Worker(format!(
            "request for partition {} sent to worker {}",
            request.partition, partition
        )));
    }

    if let Some(ms) = request.delay_ms {
        std::thread::sleep(Duration::from_millis(ms));
    }

    let pair = array::minmax(&request.values)
        .ok_or_else(|| EngineError::Worker(format!("partition {} is empty", partition)))?;
    sink.publish(pair, stdout)?;
    tracing::debug!(partition, min = pair.min, max = pair.max, "Published result");
    Ok(())
}

/// Run the worker subprocess main function.
///
/// Exits 0 after publishing, 1 on any error (leaving the channel empty).
pub fn run_worker_main(partition: usize, output: Option<PathBuf>) -> ! {
    // Cancellation belongs to the orchestrator; neither signal may cut a
    // write short here.
    unsafe {
        signal(Signal::SIGPIPE, SigHandler::SigIgn).ok();
        signal(Signal::SIGALRM, SigHandler::SigIgn).ok();
    }

    let sink = ResultSink::from_output(output);
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    match serve(partition, &mut stdin.lock(), &sink, &mut stdout.lock()) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(partition, error = %e, "Worker failed");
            std::process::exit(1);
        }
    }
}
