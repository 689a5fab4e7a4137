//! Concurrent directory walker.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct, which enumerates a directory tree
//! and pushes every regular file it finds onto the bounded file queue
//! ([`super::queue`]). Each directory is listed by its own task on a dedicated
//! rayon pool; a task spawns one new task per subdirectory it meets.
//!
//! Completion is tracked with [`PendingWork`]: the root task counts as one,
//! every spawn increments before the task is queued, and every task decrements
//! on exit (also when listing fails or the task panics). When the count reaches
//! zero no task can submit another path, and [`WalkHandle::finished`] fires.
//!
//! A directory that cannot be listed is reported as a discovery event and
//! skipped; its siblings are unaffected.
//!
//! # Features
//!
//! - One task per directory, no fixed-depth recursion on a single stack
//! - Backpressure: submissions block while the queue is full
//! - Cooperative cancellation checked before every entry and while blocked
//! - Optional symlink following, hidden-entry and empty-file skipping
//!
//! # Example
//!
//! ```no_run
//! use dupfind::events::Reporter;
//! use dupfind::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let config = WalkerConfig {
//!     skip_hidden: true,
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), config, Arc::new(Reporter::detached()));
//! let (files, handle) = walker.walk(128).unwrap();
//! let count = files.iter().count();
//! handle.wait();
//! println!("Found {} files in {} directories", count, handle.dirs_listed());
//! ```

use std::ffi::OsStr;
use std::fs::{self, FileType};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;

use super::pending::PendingWork;
use super::queue::{file_queue, FileReceiver, FileSender, SubmitError};
use super::{ScanError, WalkerConfig};
use crate::events::{Phase, Reporter, ScanEvent};

/// Directory walker for concurrent file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Event collector and cancellation token of the run
    reporter: Arc<Reporter>,
}

/// State shared by every directory task of one walk.
///
/// Holds the only [`FileSender`] of the walk, so the file queue closes once the
/// last task has dropped its reference.
struct WalkContext {
    config: WalkerConfig,
    reporter: Arc<Reporter>,
    queue: FileSender,
    pending: PendingWork,
    stats: Arc<WalkStats>,
}

#[derive(Debug, Default)]
struct WalkStats {
    dirs_listed: AtomicUsize,
    files_found: AtomicUsize,
}

/// What a directory entry turned out to be.
enum EntryKind {
    Directory,
    File,
    Skipped(&'static str),
}

impl Walker {
    /// Create a new walker for the given root.
    ///
    /// # Arguments
    ///
    /// * `path` - Root directory to scan
    /// * `config` - Walker configuration options
    /// * `reporter` - Receives discovery events; its token cancels the walk
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig, reporter: Arc<Reporter>) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            reporter,
        }
    }

    /// The root being walked.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start walking, submitting discovered files to `queue`.
    ///
    /// Returns immediately; the walk runs on its own thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ThreadPool`] if the walker threads cannot be created.
    pub fn start(&self, queue: FileSender) -> Result<WalkHandle, ScanError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("dupfind-walk-{i}"))
            .build()
            .map_err(|e| ScanError::ThreadPool(e.to_string()))?;

        let pending = PendingWork::new(1);
        let stats = Arc::new(WalkStats::default());
        let ctx = Arc::new(WalkContext {
            config: self.config.clone(),
            reporter: Arc::clone(&self.reporter),
            queue,
            pending: pending.clone(),
            stats: Arc::clone(&stats),
        });

        log::debug!(
            "Walker: starting at {} on {} threads",
            self.root.display(),
            pool.current_num_threads()
        );
        let root = self.root.clone();
        pool.spawn(move || run_dir_task(ctx, root));

        Ok(WalkHandle {
            pending,
            stats,
            pool,
        })
    }

    /// Start walking into a fresh queue of the given capacity and return the
    /// receiving end as a stream of discovered files.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ThreadPool`] if the walker threads cannot be created.
    pub fn walk(&self, capacity: usize) -> Result<(FileReceiver, WalkHandle), ScanError> {
        let (tx, rx) = file_queue(capacity);
        let handle = self.start(tx)?;
        Ok((rx, handle))
    }
}

/// Handle on a running walk.
#[derive(Debug)]
pub struct WalkHandle {
    pending: PendingWork,
    stats: Arc<WalkStats>,
    pool: rayon::ThreadPool,
}

impl WalkHandle {
    /// Receiver that becomes ready once every directory task has finished.
    #[must_use]
    pub fn finished(&self) -> &Receiver<()> {
        self.pending.done()
    }

    /// Whether every directory task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pending.is_done()
    }

    /// Block until every directory task has finished.
    pub fn wait(&self) {
        self.pending.wait();
    }

    /// Directory tasks not yet finished.
    #[must_use]
    pub fn pending_dirs(&self) -> usize {
        self.pending.outstanding()
    }

    /// Directory tasks started, including the root.
    #[must_use]
    pub fn dirs_started(&self) -> usize {
        self.pending.started()
    }

    /// Directories successfully listed.
    #[must_use]
    pub fn dirs_listed(&self) -> usize {
        self.stats.dirs_listed.load(Ordering::Relaxed)
    }

    /// Regular files accepted into the queue.
    #[must_use]
    pub fn files_found(&self) -> usize {
        self.stats.files_found.load(Ordering::Relaxed)
    }

    /// Number of walker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// Body of one directory task. The pending guard is released on every exit.
fn run_dir_task(ctx: Arc<WalkContext>, dir: PathBuf) {
    let _guard = ctx.pending.guard();
    let result = panic::catch_unwind(AssertUnwindSafe(|| walk_dir(&ctx, &dir)));
    if let Err(payload) = result {
        ctx.reporter
            .recover(&format!("listing {}", dir.display()), payload);
    }
}

fn walk_dir(ctx: &Arc<WalkContext>, dir: &Path) {
    if ctx.reporter.is_cancelled() {
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report_unlistable(ctx, dir, e);
            return;
        }
    };
    ctx.stats.dirs_listed.fetch_add(1, Ordering::Relaxed);
    log::trace!("Listing {}", dir.display());

    for entry in entries {
        if ctx.reporter.is_cancelled() {
            log::debug!("Walker: cancelled, leaving {}", dir.display());
            return;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                ctx.reporter
                    .report_entry(ScanEvent::from_io(Phase::Discovery, dir, &e));
                continue;
            }
        };

        if ctx.config.skip_hidden && is_hidden(&entry.file_name()) {
            log::trace!("Skipping hidden entry: {}", entry.path().display());
            continue;
        }

        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                ctx.reporter
                    .report_entry(ScanEvent::from_io(Phase::Discovery, &path, &e));
                continue;
            }
        };

        match classify(ctx, &path, file_type) {
            EntryKind::Directory => spawn_subdir(ctx, path),
            EntryKind::File => {
                if ctx.config.skip_empty && is_empty_file(&path) {
                    log::trace!("Skipping empty file: {}", path.display());
                    continue;
                }
                match ctx.queue.submit(path, ctx.reporter.cancel_token()) {
                    Ok(()) => {
                        ctx.stats.files_found.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(SubmitError::Cancelled) => return,
                    Err(SubmitError::Closed) => {
                        log::debug!("Walker: file queue closed, leaving {}", dir.display());
                        return;
                    }
                }
            }
            EntryKind::Skipped(reason) => {
                log::trace!("Skipping {} ({})", path.display(), reason);
            }
        }
    }
}

/// The subtree under `dir` contributes no files; siblings are unaffected.
fn report_unlistable(ctx: &WalkContext, dir: &Path, error: io::Error) {
    log::debug!("Walker: cannot list {}: {}", dir.display(), error);
    ctx.reporter.report(ScanError::from_io(dir, error).to_event());
}

fn spawn_subdir(ctx: &Arc<WalkContext>, path: PathBuf) {
    ctx.pending.add();
    let child = Arc::clone(ctx);
    rayon::spawn(move || run_dir_task(child, path));
}

fn classify(ctx: &WalkContext, path: &Path, file_type: FileType) -> EntryKind {
    if file_type.is_dir() {
        return EntryKind::Directory;
    }
    if file_type.is_file() {
        return EntryKind::File;
    }
    if !file_type.is_symlink() {
        return EntryKind::Skipped("not a regular file");
    }
    if !ctx.config.follow_symlinks {
        return EntryKind::Skipped("symlink");
    }

    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => EntryKind::Directory,
        Ok(meta) if meta.is_file() => EntryKind::File,
        Ok(_) => EntryKind::Skipped("symlink to a special file"),
        Err(e) => {
            ctx.reporter
                .report_entry(ScanEvent::from_io(Phase::Discovery, path, &e));
            EntryKind::Skipped("dangling symlink")
        }
    }
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn is_empty_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.len() == 0)
}
