//! Outstanding-work counter with a one-shot completion signal.
//!
//! The walker starts the counter at 1 for the root task, increments it before
//! spawning each subdirectory task and decrements it when a task finishes.
//! Increments only ever happen from inside a live task, so once the count hits
//! zero no further work can appear: the decrement that reaches zero closes the
//! completion channel, which wakes every waiter exactly once.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};

/// Shared counter of unfinished tasks.
#[derive(Clone)]
pub struct PendingWork {
    inner: Arc<PendingInner>,
}

struct PendingInner {
    count: AtomicUsize,
    started: AtomicUsize,
    closer: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl PendingWork {
    /// Counter with `initial` outstanding tasks. `initial` must be at least 1.
    #[must_use]
    pub fn new(initial: usize) -> Self {
        debug_assert!(initial > 0, "pending work must start non-empty");
        let (closer, done) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(PendingInner {
                count: AtomicUsize::new(initial),
                started: AtomicUsize::new(initial),
                closer: Mutex::new(Some(closer)),
                done,
            }),
        }
    }

    /// Register one more task. Call before spawning it, from a task that is
    /// itself still counted.
    pub fn add(&self) {
        let previous = self.inner.count.fetch_add(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "work added after completion");
        self.inner.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark one task finished. Returns `true` for the call that completed the
    /// whole set.
    pub fn finish(&self) -> bool {
        let previous = self.inner.count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "finish called more often than add");
        if previous == 1 {
            self.inner
                .closer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            true
        } else {
            false
        }
    }

    /// Guard that calls [`PendingWork::finish`] when dropped, including
    /// during unwinding.
    #[must_use]
    pub fn guard(&self) -> PendingGuard {
        PendingGuard { work: self.clone() }
    }

    /// Tasks not yet finished.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Total tasks ever registered.
    #[must_use]
    pub fn started(&self) -> usize {
        self.inner.started.load(Ordering::Relaxed)
    }

    /// Whether every task has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.outstanding() == 0
    }

    /// Receiver that becomes ready (disconnected) once the count reaches zero.
    #[must_use]
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Block until the count reaches zero.
    pub fn wait(&self) {
        let _ = self.inner.done.recv();
    }
}

impl fmt::Debug for PendingWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWork")
            .field("outstanding", &self.outstanding())
            .field("started", &self.started())
            .finish()
    }
}

/// Decrements a [`PendingWork`] on drop.
#[derive(Debug)]
pub struct PendingGuard {
    work: PendingWork,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.work.finish();
    }
}
