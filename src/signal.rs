//! Cooperative cancellation and Ctrl+C handling.
//!
//! [`CancelToken`] is the run-wide, set-once cancellation signal. It combines
//! an `AtomicBool` for cheap checks at the top of loops with a channel that is
//! closed on cancellation, so blocked queue operations can `select!` on it and
//! wake up immediately. Closing a channel reaches every receiver at once and
//! nothing is consumed, so any number of tasks can observe the same token.
//!
//! The first call to [`CancelToken::cancel`] stores its cause; later calls are
//! rejected and the caller is told so.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dupfind::error::ScanFailure;
//! use dupfind::signal::{install_handler, CancelToken};
//!
//! install_handler().expect("Failed to install signal handler");
//!
//! let token = CancelToken::new();
//! let _watch = dupfind::signal::watch(&token);
//! // Ctrl+C now cancels `token` with ScanFailure::Interrupted.
//!
//! assert!(!token.is_cancelled() || matches!(token.cause(), Some(ScanFailure::Interrupted)));
//! ```

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crossbeam_channel::{Receiver, Sender};

use crate::error::ScanFailure;

/// Exit code for SIGINT (Ctrl+C) interruption.
/// This follows Unix convention: 128 + signal number (SIGINT = 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared, set-once cancellation signal for one scan.
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    cause: OnceLock<ScanFailure>,
    // Never sent on; dropping it disconnects `signal`.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    /// Create a token in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (trigger, signal) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                cause: OnceLock::new(),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Check whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel with `cause`. Returns `true` if this call transitioned the token,
    /// `false` if it was already cancelled (the earlier cause is kept).
    pub fn cancel(&self, cause: ScanFailure) -> bool {
        if self.inner.cause.set(cause).is_err() {
            return false;
        }
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        true
    }

    /// The stored cause, if cancelled.
    #[must_use]
    pub fn cause(&self) -> Option<ScanFailure> {
        self.inner.cause.get().cloned()
    }

    /// Receiver that becomes ready (disconnected) once the token is cancelled.
    ///
    /// Use it as an arm of `crossbeam_channel::select!` next to a blocking send
    /// or receive.
    #[must_use]
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Block until the token is cancelled.
    pub fn wait(&self) {
        // Disconnection is the only way this returns.
        let _ = self.inner.signal.recv();
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("cause", &self.inner.cause.get())
            .finish()
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

/// Token of the scan currently watched by the Ctrl+C handler.
static WATCHED: Mutex<Option<CancelToken>> = Mutex::new(None);
static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the process-wide Ctrl+C handler.
///
/// Safe to call repeatedly; only the first call registers the hook. If a
/// handler was already registered by someone else (e.g. another test), the
/// error is logged and ignored: tokens can still be cancelled manually.
pub fn install_handler() -> Result<(), SignalError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let result = ctrlc::set_handler(|| {
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Cleaning up...");
        let _ = std::io::stderr().flush();

        let watched = WATCHED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = watched {
            token.cancel(ScanFailure::Interrupted);
        }
        log::info!("Shutdown signal received");
    });

    match result {
        Ok(()) => {
            let _ = INSTALLED.set(());
            Ok(())
        }
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C handler already registered, scans cancel only manually");
            let _ = INSTALLED.set(());
            Ok(())
        }
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}

/// Route Ctrl+C to `token` until the returned guard is dropped.
#[must_use = "the token stops being watched when the guard is dropped"]
pub fn watch(token: &CancelToken) -> WatchGuard {
    *WATCHED.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
    WatchGuard {
        token: token.clone(),
    }
}

/// Guard returned by [`watch`].
#[derive(Debug)]
pub struct WatchGuard {
    token: CancelToken,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        let mut watched = WATCHED.lock().unwrap_or_else(PoisonError::into_inner);
        if watched
            .as_ref()
            .is_some_and(|t| Arc::ptr_eq(&t.inner, &self.token.inner))
        {
            *watched = None;
        }
    }
}
