//! Scan coordinator.
//!
//! # Overview
//!
//! [`DuplicateFinder`] owns one run end to end:
//!
//! 1. Checks the configured limits (else `InvalidConfig`) and that the root
//!    is a readable directory (else `RootUnreadable`)
//! 2. Creates the bounded file queue, the [`DuplicateIndex`] and the
//!    [`Reporter`] for this run
//! 3. Starts the hashing [`WorkerPool`], then the [`Walker`]
//! 4. Waits for either directory discovery to finish or the run to be
//!    cancelled, whichever comes first
//! 5. Lets the workers drain every file submitted before discovery finished
//! 6. Returns [`RunResult::Completed`] with the duplicate groups, or
//!    [`RunResult::Cancelled`] with the first failure
//!
//! Progress is modelled by [`RunState`]:
//! `Running → DirsComplete → FilesDraining → Completed | Cancelled`.
//! Every wait blocks on a channel; nothing polls or sleeps.
//!
//! # Example
//!
//! ```no_run
//! use dupfind::duplicates::{DuplicateFinder, FinderConfig, RunResult};
//! use std::path::Path;
//!
//! let finder = DuplicateFinder::new(FinderConfig::default().with_workers(8));
//! match finder.run(Path::new(".")) {
//!     RunResult::Completed(report) => {
//!         for group in &report.groups {
//!             println!("{}: {:?}", group.digest, group.paths);
//!         }
//!     }
//!     RunResult::Cancelled(cause) => eprintln!("Scan failed: {}", cause),
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use crossbeam_channel::select;
use serde::{Serialize, Serializer};

use super::index::{DuplicateGroup, DuplicateIndex};
use super::pool::{PoolStats, WorkerPool, MAX_WORKERS};
use crate::error::{ExitCode, ScanFailure};
use crate::events::{ErrorPolicy, EventSink, LogSink, Reporter, ScanEvent};
use crate::scanner::{
    file_queue, ContentHasher, HashAlgorithm, Hasher, Walker, WalkerConfig, MAX_QUEUE_CAPACITY,
};
use crate::signal::{self, CancelToken};

/// Default number of paths buffered between the walker and the workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Configuration for the duplicate finder.
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// Hashing worker threads (0 = available parallelism).
    pub workers: usize,
    /// Capacity of the file queue (0 = rendezvous).
    pub queue_capacity: usize,
    /// Directory walker threads (0 = available parallelism).
    pub walk_threads: usize,
    /// Cancel the run on the first unreadable file or subtree.
    pub strict: bool,
    /// Content digest algorithm.
    pub algorithm: HashAlgorithm,
    /// Walker filtering and symlink options.
    pub walker: WalkerConfig,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            walk_threads: 0,
            strict: false,
            algorithm: HashAlgorithm::default(),
            walker: WalkerConfig::default(),
        }
    }
}

impl FinderConfig {
    /// Set the number of hashing workers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the file queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the number of directory walker threads.
    #[must_use]
    pub fn with_walk_threads(mut self, threads: usize) -> Self {
        self.walk_threads = threads;
        self
    }

    /// Set fail-fast on any unreadable file or subtree.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the digest algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker = config;
        self
    }

    /// Check that every limit is within what the pipeline supports.
    ///
    /// # Errors
    ///
    /// Returns [`ScanFailure::InvalidConfig`] naming the first offending
    /// setting.
    pub fn validate(&self) -> Result<(), ScanFailure> {
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ScanFailure::InvalidConfig(format!(
                "queue_capacity {} exceeds the maximum of {}",
                self.queue_capacity, MAX_QUEUE_CAPACITY
            )));
        }
        if self.workers > MAX_WORKERS {
            return Err(ScanFailure::InvalidConfig(format!(
                "workers {} exceeds the maximum of {}",
                self.workers, MAX_WORKERS
            )));
        }
        Ok(())
    }

    /// Worker count with 0 resolved to the available parallelism.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism().map_or(4, NonZeroUsize::get)
        } else {
            self.workers
        }
    }
}

/// Progress of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Walker and workers both active.
    Running,
    /// Every directory task finished; no more paths will be submitted.
    DirsComplete,
    /// Workers are finishing the paths already submitted.
    FilesDraining,
    /// Terminal success.
    Completed,
    /// Terminal failure; partial results are discarded.
    Cancelled,
}

impl RunState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Running, DirsComplete)
                | (DirsComplete, FilesDraining)
                | (FilesDraining, Completed)
                | (Running | DirsComplete | FilesDraining, Cancelled)
        )
    }

    /// Whether the run has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::DirsComplete => "dirs-complete",
            Self::FilesDraining => "files-draining",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(duration.as_millis())
}

/// Statistics of a completed scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Files accepted into the queue by the walker
    pub files_submitted: usize,
    /// Files hashed and recorded in the index
    pub files_hashed: usize,
    /// Directories successfully listed
    pub dirs_walked: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Number of duplicate groups
    pub duplicate_groups: usize,
    /// Total number of duplicate files (excluding one original per group)
    pub duplicate_files: usize,
    /// Digests seen exactly once
    pub unique_files: usize,
    /// Directories that could not be listed
    pub subtree_errors: usize,
    /// Entries skipped inside listed directories (unreadable entries,
    /// dangling symlinks)
    pub entry_errors: usize,
    /// Files that could not be read
    pub file_errors: usize,
    /// Every recoverable event of the run
    pub events: Vec<ScanEvent>,
    /// Hashing worker threads
    pub workers: usize,
    /// Wall-clock duration of the run
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub scan_duration: Duration,
    /// Directory tasks still pending at the end (0 on completion)
    pub pending_dirs: usize,
    /// Files submitted but not processed at the end (0 on completion)
    pub outstanding_files: usize,
}

impl ScanSummary {
    /// Whether some files or subtrees were skipped.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.subtree_errors > 0 || self.entry_errors > 0 || self.file_errors > 0
    }

    /// Bytes hashed as a human-readable string.
    #[must_use]
    pub fn bytes_display(&self) -> String {
        ByteSize::b(self.bytes_hashed).to_string()
    }
}

/// Result of a completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Duplicate groups sorted by digest
    pub groups: Vec<DuplicateGroup>,
    /// Run statistics
    pub summary: ScanSummary,
}

impl ScanReport {
    /// Hex digest → paths, for every group.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Vec<PathBuf>> {
        self.groups
            .iter()
            .map(|g| (g.digest.to_hex(), g.paths.clone()))
            .collect()
    }

    /// Whether at least one duplicate group was found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Exit code for a completed run.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.summary.is_partial() {
            ExitCode::PartialSuccess
        } else if self.has_duplicates() {
            ExitCode::Success
        } else {
            ExitCode::NoDuplicates
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone)]
pub enum RunResult {
    /// Every directory was walked and every submitted file processed.
    Completed(ScanReport),
    /// The run stopped early; holds the first failure.
    Cancelled(ScanFailure),
}

impl RunResult {
    /// Whether the run completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Convert into a standard `Result`.
    ///
    /// # Errors
    ///
    /// Returns the cancellation cause for a cancelled run.
    pub fn into_result(self) -> Result<ScanReport, ScanFailure> {
        match self {
            Self::Completed(report) => Ok(report),
            Self::Cancelled(cause) => Err(cause),
        }
    }
}

/// Duplicate finder that coordinates the walker and the hashing workers.
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: Arc<dyn ContentHasher>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for DuplicateFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateFinder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        let hasher = Arc::new(Hasher::with_algorithm(config.algorithm));
        Self {
            config,
            hasher,
            sink: Arc::new(LogSink),
        }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// Replace the content hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replace the event sink (defaults to [`LogSink`]).
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The finder configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Scan `root` with a fresh cancellation token watched by the Ctrl+C
    /// handler (if installed).
    pub fn run(&self, root: &Path) -> RunResult {
        let cancel = CancelToken::new();
        let _watch = signal::watch(&cancel);
        self.run_with_cancel(root, &cancel)
    }

    /// Scan `root`, stopping early once `cancel` fires.
    pub fn run_with_cancel(&self, root: &Path, cancel: &CancelToken) -> RunResult {
        let start = Instant::now();
        log::info!("Scanning {}", root.display());

        if let Err(failure) = self.config.validate().and_then(|()| check_root(root)) {
            cancel.cancel(failure.clone());
            log::error!("{}", failure);
            return RunResult::Cancelled(failure);
        }

        let reporter = Arc::new(Reporter::new(
            Arc::clone(&self.sink),
            ErrorPolicy::from_strict(self.config.strict),
            cancel.clone(),
        ));
        let index = Arc::new(DuplicateIndex::new());
        let (tx, rx) = file_queue(self.config.queue_capacity);

        let pool = match WorkerPool::spawn(
            self.config.effective_workers(),
            &rx,
            Arc::clone(&self.hasher),
            Arc::clone(&index),
            Arc::clone(&reporter),
        ) {
            Ok(pool) => pool,
            Err(failure) => return RunResult::Cancelled(failure),
        };

        let walker_config = self
            .config
            .walker
            .clone()
            .with_threads(self.config.walk_threads);
        let walker = Walker::new(root, walker_config, Arc::clone(&reporter));
        let walk = match walker.start(tx) {
            Ok(walk) => walk,
            Err(e) => {
                reporter.fail(ScanFailure::Internal {
                    context: "starting directory walk".to_string(),
                    message: e.to_string(),
                });
                pool.join();
                return cancelled(cancel);
            }
        };

        let mut state = RunState::Running;
        select! {
            recv(walk.finished()) -> _ => advance(&mut state, RunState::DirsComplete),
            recv(cancel.signal()) -> _ => advance(&mut state, RunState::Cancelled),
        }

        if state == RunState::Cancelled {
            // Tasks notice the token at their next check; wait so none outlives the run.
            walk.wait();
            let stats = pool.join();
            log::debug!(
                "Cancelled with {} files hashed, {} discarded",
                stats.files_hashed,
                stats.discarded
            );
            return cancelled(cancel);
        }

        log::debug!(
            "Discovery finished: {} directories, {} files submitted",
            walk.dirs_listed(),
            rx.submitted()
        );
        advance(&mut state, RunState::FilesDraining);
        let stats = pool.join();

        if cancel.is_cancelled() {
            advance(&mut state, RunState::Cancelled);
            return cancelled(cancel);
        }
        advance(&mut state, RunState::Completed);

        let groups = index.groups();
        let summary = build_summary(
            &stats,
            &groups,
            &index,
            &reporter,
            walk.dirs_listed(),
            walk.pending_dirs(),
            rx.submitted(),
            rx.outstanding(),
            start.elapsed(),
        );
        log::info!(
            "Scan complete: {} files ({}) hashed in {:.2?}, {} duplicate groups",
            summary.files_hashed,
            summary.bytes_display(),
            summary.scan_duration,
            summary.duplicate_groups
        );

        RunResult::Completed(ScanReport { groups, summary })
    }
}

fn advance(state: &mut RunState, next: RunState) {
    debug_assert!(
        state.can_advance_to(next),
        "illegal run transition {state} -> {next}"
    );
    log::debug!("Run state: {} -> {}", state, next);
    *state = next;
}

fn cancelled(cancel: &CancelToken) -> RunResult {
    let cause = cancel.cause().unwrap_or_else(|| ScanFailure::Internal {
        context: "finishing the run".to_string(),
        message: "cancelled without a recorded cause".to_string(),
    });
    log::error!("Scan cancelled: {}", cause);
    RunResult::Cancelled(cause)
}

fn check_root(root: &Path) -> Result<(), ScanFailure> {
    let meta = fs::metadata(root).map_err(|e| ScanFailure::root_unreadable(root, e))?;
    if !meta.is_dir() {
        return Err(ScanFailure::root_unreadable(
            root,
            io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        ));
    }
    fs::read_dir(root).map_err(|e| ScanFailure::root_unreadable(root, e))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_summary(
    stats: &PoolStats,
    groups: &[DuplicateGroup],
    index: &DuplicateIndex,
    reporter: &Reporter,
    dirs_walked: usize,
    pending_dirs: usize,
    files_submitted: usize,
    outstanding_files: usize,
    scan_duration: Duration,
) -> ScanSummary {
    ScanSummary {
        files_submitted,
        files_hashed: stats.files_hashed,
        dirs_walked,
        bytes_hashed: stats.bytes_hashed,
        duplicate_groups: groups.len(),
        duplicate_files: groups.iter().map(DuplicateGroup::duplicate_count).sum(),
        unique_files: index.unique_count(),
        subtree_errors: reporter.subtree_errors(),
        entry_errors: reporter.entry_errors(),
        file_errors: reporter.file_errors(),
        events: reporter.events(),
        workers: stats.workers,
        scan_duration,
        pending_dirs,
        outstanding_files,
    }
}
