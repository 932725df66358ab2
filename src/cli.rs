//! Command-line interface definitions using clap.

use crate::engine::{EngineConfig, Transport};
use crate::error::Result;
use crate::output::OutputFormat;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Parallel min/max over isolated worker processes.
#[derive(Parser, Debug)]
#[command(name = "pminmax")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging on stderr (-v for info, -vv for debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute min/max with one worker process per partition.
    Run(RunArgs),

    /// Compute min/max with a single-pass scan in this process.
    Sequential(SequentialArgs),

    /// Internal: worker subprocess mode.
    #[command(hide = true)]
    Worker(WorkerArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Parse a strictly positive count.
fn parse_positive(s: &str) -> std::result::Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be positive".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Input array parameters shared by `run` and `sequential`.
#[derive(Parser, Debug, Clone)]
pub struct InputArgs {
    /// Seed for the array generator.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub seed: u32,

    /// Number of elements to generate.
    #[arg(long, alias = "array_size", value_parser = parse_positive)]
    pub array_size: usize,
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Number of worker processes.
    #[arg(long, value_parser = parse_positive)]
    pub pnum: usize,

    /// How workers return their results.
    #[arg(long, value_enum, default_value_t = TransportArg::Pipe)]
    pub transport: TransportArg,

    /// Shorthand for `--transport file`.
    #[arg(short = 'f', long, conflicts_with = "transport")]
    pub by_files: bool,

    /// Kill outstanding workers after this many seconds (0 = immediately).
    #[arg(long, env = "PMINMAX_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Directory for file-transport artifacts.
    #[arg(long, env = "PMINMAX_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,

    /// Program to run as worker (defaults to this executable).
    #[arg(long, env = "PMINMAX_WORKER_EXE", hide = true)]
    pub worker_exe: Option<PathBuf>,

    /// Make every worker sleep before scanning.
    #[arg(long, hide = true)]
    pub worker_delay_ms: Option<u64>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormatArg::Text)]
    pub format: OutputFormatArg,
}

impl RunArgs {
    /// Effective transport after applying `--by-files`.
    pub fn transport(&self) -> Transport {
        if self.by_files {
            Transport::File
        } else {
            self.transport.into()
        }
    }

    /// Build the engine configuration from these arguments.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            pnum: self.pnum,
            transport: self.transport(),
            timeout_secs: self.timeout,
            work_dir: self.work_dir.clone(),
            worker_program: crate::engine::worker_program(self.worker_exe.clone())?,
            worker_delay_ms: self.worker_delay_ms,
        })
    }
}

/// Arguments for the sequential command.
#[derive(Parser, Debug)]
pub struct SequentialArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormatArg::Text)]
    pub format: OutputFormatArg,
}

/// Arguments for worker mode.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Partition this worker is responsible for.
    #[arg(long)]
    pub partition: usize,

    /// Write the result to this file instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Arguments for shell completions.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate and print completions to stdout.
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "pminmax",
            &mut std::io::stdout(),
        );
    }
}

/// Transport argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportArg {
    /// One pipe per worker.
    #[default]
    Pipe,
    /// One artifact file per worker.
    File,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Pipe => Transport::Pipe,
            TransportArg::File => Transport::File,
        }
    }
}

/// Output format argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormatArg {
    /// Plain text lines.
    #[default]
    Text,
    /// JSON output.
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Text => OutputFormat::Text,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}
