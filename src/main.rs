//! pminmax - parallel min/max over isolated worker processes

mod array;
mod cli;
mod engine;
mod error;
mod logging;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};

use cli::{Cli, Commands};

/// Program entry point: parses arguments, dispatches the subcommand and maps
/// every failure to exit code 1.
///
/// Argument errors also exit with 1 (clap's own default would be 2); help and
/// version output exit with 0.
fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    logging::init(logging::LogConfig::from_verbosity(cli.verbose, cli.quiet).with_env_overrides());

    let result = match &cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Sequential(args) => cmd_sequential(args),
        Commands::Worker(args) => engine::run_worker_main(args.partition, args.output.clone()),
        Commands::Completions(args) => {
            args.generate();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Generate the array, run it through the worker engine and print the report.
///
/// A run that hit its timeout still succeeds; the report carries the warning.
fn cmd_run(args: &cli::RunArgs) -> Result<()> {
    let config = args.engine_config()?;
    tracing::info!(
        seed = args.input.seed,
        array_size = args.input.array_size,
        pnum = config.pnum,
        transport = %config.transport,
        timeout_secs = ?config.timeout_secs,
        "Starting parallel run"
    );

    let values = array::generate(args.input.seed, args.input.array_size)?;
    let report = engine::Orchestrator::new(config).run(&values)?;

    output::write_report(&mut std::io::stdout().lock(), &report, args.format.into())
        .context("Failed to write report")?;
    Ok(())
}

/// Single-pass reference scan over the same generated array.
fn cmd_sequential(args: &cli::SequentialArgs) -> Result<()> {
    let values = array::generate(args.input.seed, args.input.array_size)?;
    let result = array::minmax(&values).context("Array is empty")?;
    output::write_sequential(&mut std::io::stdout().lock(), result, args.format.into())
        .context("Failed to write result")?;
    Ok(())
}
