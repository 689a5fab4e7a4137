//! Command-line interface definitions for dupfind.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Scan options are optional so that values from the config file and the
//! environment are only overridden when a flag is actually given.
//!
//! # Example
//!
//! ```bash
//! # Scan the current directory
//! dupfind scan
//!
//! # Scan with JSON output for scripting
//! dupfind scan ~/Downloads --output json
//!
//! # Eight hashing workers, MD5 digests, stop at the first unreadable file
//! dupfind scan ~/Downloads --workers 8 --algorithm md5 --strict
//!
//! # Verbose mode for debugging
//! dupfind -v scan ~/Downloads
//! ```

use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::duplicates::MAX_WORKERS;
use crate::scanner::{HashAlgorithm, MAX_QUEUE_CAPACITY};

/// Concurrent duplicate file finder.
///
/// dupfind walks a directory tree in parallel, hashes every regular file and
/// reports groups of files with identical content.
#[derive(Debug, Parser)]
#[command(name = "dupfind")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print errors as JSON objects on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for dupfind.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory for duplicate files
    Scan(ScanArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory path to scan for duplicates
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Number of hashing worker threads (0 = available parallelism)
    #[arg(
        long,
        value_name = "N",
        value_parser = RangedU64ValueParser::<usize>::new().range(..=MAX_WORKERS as u64)
    )]
    pub workers: Option<usize>,

    /// Number of directory walker threads (0 = available parallelism)
    #[arg(long, value_name = "N")]
    pub walk_threads: Option<usize>,

    /// Paths buffered between the walker and the workers
    #[arg(
        long,
        value_name = "N",
        value_parser = RangedU64ValueParser::<usize>::new().range(..=MAX_QUEUE_CAPACITY as u64)
    )]
    pub queue_capacity: Option<usize>,

    /// Content digest algorithm
    #[arg(long, value_enum)]
    pub algorithm: Option<AlgorithmArg>,

    /// Cancel the scan at the first unreadable file or directory
    #[arg(long)]
    pub strict: bool,

    /// Follow symbolic links during scan
    ///
    /// Warning: May cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Skip zero-length files
    #[arg(long)]
    pub skip_empty: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Output format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per duplicate group
    Text,
    /// JSON output for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Digest algorithm as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AlgorithmArg {
    /// BLAKE3 (default)
    #[default]
    Blake3,
    /// MD5
    Md5,
}

impl From<AlgorithmArg> for HashAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Blake3 => HashAlgorithm::Blake3,
            AlgorithmArg::Md5 => HashAlgorithm::Md5,
        }
    }
}
