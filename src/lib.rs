//! dupfind - Concurrent duplicate file finder
//!
//! Finds files with identical content under a directory tree. Directories are
//! listed in parallel (one task per directory), discovered files flow through
//! a bounded queue to a pool of hashing workers, and a shared index groups
//! paths by digest as results arrive.
//!
//! The library entry point is [`duplicates::DuplicateFinder`]; the binary
//! wraps it with [`run_app`].

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod events;
pub mod logging;
pub mod output;
pub mod scanner;
pub mod signal;

use std::io::{self, Write};

use anyhow::{Context, Result};

use cli::{Cli, Commands, OutputFormat, ScanArgs};
use config::Config;
use duplicates::DuplicateFinder;
use error::ExitCode;
use output::{JsonOutput, TextOutput};

/// Run the application for parsed CLI arguments.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the scan is cancelled, or the
/// results cannot be written. A cancelled scan's error wraps the
/// [`error::ScanFailure`] cause.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let Commands::Scan(args) = cli.command;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_scan(&args, &mut out)
}

/// Run one scan and render the result to `out`.
///
/// # Errors
///
/// See [`run_app`].
pub fn run_scan<W: Write>(args: &ScanArgs, out: &mut W) -> Result<ExitCode> {
    let mut config =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.merge_scan_args(args);
    log::debug!("Effective configuration: {:?}", config);

    if let Err(e) = signal::install_handler() {
        log::warn!("Ctrl+C handling unavailable: {}", e);
    }

    let finder = DuplicateFinder::new(config.finder_config());
    let report = finder.run(&args.path).into_result()?;

    match args.output {
        OutputFormat::Text => TextOutput::new(&report)
            .write_to(out)
            .context("Failed to write results")?,
        OutputFormat::Json => JsonOutput::new(&report)
            .write_to(out, true)
            .context("Failed to write results")?,
    }

    if report.summary.is_partial() {
        log::warn!(
            "Skipped {} unreadable directories, {} unreadable entries and {} unreadable files",
            report.summary.subtree_errors,
            report.summary.entry_errors,
            report.summary.file_errors
        );
    }
    Ok(report.exit_code())
}
