//! Fixed-size pool of hashing workers.
//!
//! Each worker is a named OS thread that repeatedly takes one path from the
//! file queue, hashes it and records the digest in the [`DuplicateIndex`].
//! A worker exits when the queue is closed and drained or when the run is
//! cancelled. At most `workers` files are open at any time.
//!
//! Read failures are reported to the [`Reporter`] and the file is skipped. A
//! digest computed after cancellation is discarded rather than committed.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::index::{DuplicateIndex, GroupUpdate};
use crate::error::ScanFailure;
use crate::events::Reporter;
use crate::scanner::{ContentHasher, FileReceiver};

/// Largest supported number of hashing workers.
pub const MAX_WORKERS: usize = 1024;

/// Counters shared by all workers.
#[derive(Debug, Default)]
struct PoolCounters {
    files_hashed: AtomicUsize,
    bytes_hashed: AtomicU64,
    discarded: AtomicUsize,
}

/// Final worker statistics, taken after every worker has exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Files whose digest was committed to the index.
    pub files_hashed: usize,
    /// Bytes read from committed files.
    pub bytes_hashed: u64,
    /// Files hashed after cancellation whose digest was dropped.
    pub discarded: usize,
    /// Workers that ran.
    pub workers: usize,
}

struct Worker {
    hasher: Arc<dyn ContentHasher>,
    index: Arc<DuplicateIndex>,
    reporter: Arc<Reporter>,
    counters: Arc<PoolCounters>,
}

/// Running hashing workers.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Start `workers` threads consuming `files` (clamped to `1..=MAX_WORKERS`).
    ///
    /// # Errors
    ///
    /// Returns [`ScanFailure::Internal`] if a thread cannot be spawned. The run
    /// is cancelled and any thread already started is joined before returning.
    pub fn spawn(
        workers: usize,
        files: &FileReceiver,
        hasher: Arc<dyn ContentHasher>,
        index: Arc<DuplicateIndex>,
        reporter: Arc<Reporter>,
    ) -> Result<Self, ScanFailure> {
        let workers = workers.clamp(1, MAX_WORKERS);
        let counters = Arc::new(PoolCounters::default());
        let mut handles = Vec::with_capacity(workers);

        for i in 0..workers {
            let worker = Worker {
                hasher: Arc::clone(&hasher),
                index: Arc::clone(&index),
                reporter: Arc::clone(&reporter),
                counters: Arc::clone(&counters),
            };
            let files = files.clone();
            let spawned = thread::Builder::new()
                .name(format!("dupfind-hash-{i}"))
                .spawn(move || worker.run(&files));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => return Err(abort_startup(&reporter, handles, &e)),
            }
        }

        log::debug!("Worker pool: {} hashing threads started", workers);
        Ok(Self { handles, counters })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the pool has no workers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Files committed so far.
    #[must_use]
    pub fn files_hashed(&self) -> usize {
        self.counters.files_hashed.load(Ordering::Relaxed)
    }

    /// Wait for every worker to exit and return the final counters.
    pub fn join(self) -> PoolStats {
        let workers = self.handles.len();
        for handle in self.handles {
            // Worker bodies catch their own panics; a join error means the
            // panic hook itself panicked and there is nothing left to report.
            if handle.join().is_err() {
                log::error!("Hashing worker terminated abnormally");
            }
        }
        PoolStats {
            files_hashed: self.counters.files_hashed.load(Ordering::Relaxed),
            bytes_hashed: self.counters.bytes_hashed.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            workers,
        }
    }
}

fn abort_startup(
    reporter: &Reporter,
    started: Vec<JoinHandle<()>>,
    error: &io::Error,
) -> ScanFailure {
    let failure = ScanFailure::Internal {
        context: "starting hashing workers".to_string(),
        message: error.to_string(),
    };
    reporter.fail(failure.clone());
    for handle in started {
        let _ = handle.join();
    }
    failure
}

impl Worker {
    fn run(&self, files: &FileReceiver) {
        let cancel = self.reporter.cancel_token();
        while let Some(file) = files.next(cancel) {
            let path = file.path();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(path)));
            if let Err(payload) = outcome {
                self.reporter
                    .recover(&format!("hashing {}", path.display()), payload);
            }
        }
        log::trace!(
            "{} exiting",
            thread::current().name().unwrap_or("hashing worker")
        );
    }

    fn process(&self, path: &Path) {
        let hashed = match self.hasher.hash_file(path) {
            Ok(hashed) => hashed,
            Err(e) => {
                self.reporter.report(e.to_event());
                return;
            }
        };

        if self.reporter.is_cancelled() {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.counters.files_hashed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_hashed
            .fetch_add(hashed.len, Ordering::Relaxed);

        if let GroupUpdate::NewGroup { first, second } = self.index.observe(hashed.digest, path) {
            log::debug!(
                "Duplicate: {} matches {}",
                second.display(),
                first.display()
            );
        }
    }
}
