//! Report formatting for stdout.

use crate::array::MinMax;
use crate::engine::{RunOutcome, RunReport, Transport};
use serde::Serialize;
use std::io::{self, Write};

/// Warning line printed after a run that hit its timeout.
pub const TIMEOUT_WARNING: &str = "Warning: Some child processes were terminated due to timeout.";

/// Output format for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `Min:`/`Max:`/`Elapsed time:` lines.
    #[default]
    Text,
    /// A single JSON object.
    Json,
}

#[derive(Serialize)]
struct JsonRunReport {
    min: Option<i32>,
    max: Option<i32>,
    elapsed_ms: f64,
    outcome: RunOutcome,
    timed_out: bool,
    transport: Transport,
    partitions: usize,
    contributors: usize,
}

fn fmt_extremum(value: Option<i32>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

/// Write a parallel run report.
pub fn write_report<W: Write>(out: &mut W, report: &RunReport, format: OutputFormat) -> io::Result<()> {
    let elapsed_ms = report.elapsed.as_secs_f64() * 1000.0;
    match format {
        OutputFormat::Text => {
            writeln!(out, "Min: {}", fmt_extremum(report.result.map(|r| r.min)))?;
            writeln!(out, "Max: {}", fmt_extremum(report.result.map(|r| r.max)))?;
            writeln!(out, "Elapsed time: {:.6}ms", elapsed_ms)?;
            if report.timed_out() {
                writeln!(out, "{}", TIMEOUT_WARNING)?;
            }
        }
        OutputFormat::Json => {
            let json = JsonRunReport {
                min: report.result.map(|r| r.min),
                max: report.result.map(|r| r.max),
                elapsed_ms,
                outcome: report.outcome,
                timed_out: report.timed_out(),
                transport: report.transport,
                partitions: report.partitions,
                contributors: report.contributors,
            };
            serde_json::to_writer_pretty(&mut *out, &json)?;
            writeln!(out)?;
        }
    }
    out.flush()
}

/// Write the result of a single-pass scan.
pub fn write_sequential<W: Write>(out: &mut W, result: MinMax, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(out, "Min: {}", result.min)?;
            writeln!(out, "Max: {}", result.max)?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &result)?;
            writeln!(out)?;
        }
    }
    out.flush()
}
