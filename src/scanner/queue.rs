//! Bounded file-name queue between the walker and the hashing pool.
//!
//! Every blocking operation selects on the run's [`CancelToken`] as well, so a
//! producer stuck on a full queue or a consumer waiting on an empty one wakes up
//! as soon as the run is cancelled.
//!
//! The queue tracks outstanding files: a path counts from the moment it is
//! submitted until the [`QueuedFile`] handed to a worker is dropped. The queue
//! closes when every [`FileSender`] is gone; receivers then drain what is left
//! and return `None`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{select, Receiver, Sender};

use crate::signal::CancelToken;

/// Why a submission did not enter the queue.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The run was cancelled before or while waiting for room.
    #[error("scan cancelled")]
    Cancelled,
    /// Every receiver has been dropped.
    #[error("file queue closed")]
    Closed,
}

#[derive(Debug, Default)]
struct Counters {
    outstanding: AtomicUsize,
    submitted: AtomicUsize,
}

/// Largest supported queue capacity. The channel allocates its whole buffer
/// up front.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Create a queue holding at most `capacity` paths (0 = rendezvous).
///
/// Capacities above [`MAX_QUEUE_CAPACITY`] are clamped to it.
#[must_use]
pub fn file_queue(capacity: usize) -> (FileSender, FileReceiver) {
    if capacity > MAX_QUEUE_CAPACITY {
        log::warn!(
            "Queue capacity {} exceeds {}, clamping",
            capacity,
            MAX_QUEUE_CAPACITY
        );
    }
    let (tx, rx) = crossbeam_channel::bounded(capacity.min(MAX_QUEUE_CAPACITY));
    let counters = Arc::new(Counters::default());
    (
        FileSender {
            tx,
            counters: counters.clone(),
        },
        FileReceiver { rx, counters },
    )
}

/// Producer side, cloned into every directory task.
#[derive(Debug, Clone)]
pub struct FileSender {
    tx: Sender<PathBuf>,
    counters: Arc<Counters>,
}

impl FileSender {
    /// Submit a path, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Cancelled`] once `cancel` fires (also while blocked),
    /// [`SubmitError::Closed`] if no receiver is left.
    pub fn submit(&self, path: PathBuf, cancel: &CancelToken) -> Result<(), SubmitError> {
        if cancel.is_cancelled() {
            return Err(SubmitError::Cancelled);
        }

        self.counters.outstanding.fetch_add(1, Ordering::SeqCst);
        let result = select! {
            send(self.tx, path) -> res => res.map_err(|_| SubmitError::Closed),
            recv(cancel.signal()) -> _ => Err(SubmitError::Cancelled),
        };

        match result {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.counters.outstanding.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

/// Consumer side, cloned into every worker.
#[derive(Debug, Clone)]
pub struct FileReceiver {
    rx: Receiver<PathBuf>,
    counters: Arc<Counters>,
}

impl FileReceiver {
    /// Take the next path, blocking until one is available.
    ///
    /// Returns `None` when the queue is closed and drained, or when `cancel`
    /// fires.
    pub fn next(&self, cancel: &CancelToken) -> Option<QueuedFile> {
        if cancel.is_cancelled() {
            return None;
        }
        select! {
            recv(self.rx) -> msg => msg.ok().map(|path| self.claim(path)),
            recv(cancel.signal()) -> _ => None,
        }
    }

    /// Iterate over paths until the queue is closed and drained.
    pub fn iter(&self) -> impl Iterator<Item = QueuedFile> + '_ {
        self.rx.iter().map(move |path| self.claim(path))
    }

    /// Files submitted but not yet released by a worker.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.counters.outstanding.load(Ordering::SeqCst)
    }

    /// Files accepted into the queue so far.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.counters.submitted.load(Ordering::Relaxed)
    }

    /// Paths currently buffered in the queue.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    /// Maximum number of buffered paths.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    fn claim(&self, path: PathBuf) -> QueuedFile {
        QueuedFile {
            path,
            counters: self.counters.clone(),
        }
    }
}

/// A path taken from the queue. Dropping it marks the file as processed.
#[derive(Debug)]
pub struct QueuedFile {
    path: PathBuf,
    counters: Arc<Counters>,
}

impl QueuedFile {
    /// The file to process.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for QueuedFile {
    fn drop(&mut self) {
        self.counters.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
