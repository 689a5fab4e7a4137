//! Structured failure events and the per-run reporter.
//!
//! Every problem met during a scan is described by a [`ScanEvent`]
//! `{phase, path, kind, cause}`. The [`Reporter`] classifies each event with the
//! run's [`ErrorPolicy`] into a [`Severity`]:
//!
//! - [`Severity::Recoverable`]: the file or subtree is skipped, the event is
//!   recorded for the summary and handed to the [`EventSink`].
//! - [`Severity::Fatal`]: additionally cancels the run with
//!   [`ScanFailure::Escalated`].
//!
//! Panics caught inside walker tasks and workers go through
//! [`Reporter::recover`], which always cancels.
//!
//! The core never decides how events are rendered; [`LogSink`] forwards them
//! to the `log` facade and callers may install their own sink.

use std::any::Any;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::ScanFailure;
use crate::signal::CancelToken;

/// Which wavefront of the scan produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Listing a directory.
    Discovery,
    /// Reading and hashing a file.
    Hashing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery => f.write_str("discovery"),
            Self::Hashing => f.write_str("hashing"),
        }
    }
}

/// Failure classification shared by listing and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The entry vanished or never existed.
    NotFound,
    /// The process lacks permission to open or list the entry.
    PermissionDenied,
    /// Any other I/O error.
    IoFailure,
}

impl EventKind {
    /// Map an [`io::ErrorKind`] onto the event taxonomy.
    #[must_use]
    pub fn from_io(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::IoFailure,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::IoFailure => f.write_str("I/O failure"),
        }
    }
}

/// One structured failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEvent {
    /// Discovery (subtree listing) or hashing (file read).
    pub phase: Phase,
    /// The directory or file the failure refers to.
    pub path: PathBuf,
    /// Failure classification.
    pub kind: EventKind,
    /// Underlying error message.
    pub cause: String,
}

impl ScanEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(phase: Phase, path: PathBuf, kind: EventKind, cause: impl Into<String>) -> Self {
        Self {
            phase,
            path,
            kind,
            cause: cause.into(),
        }
    }

    /// Create an event from an I/O error, classifying it by kind.
    #[must_use]
    pub fn from_io(phase: Phase, path: &Path, error: &io::Error) -> Self {
        Self::new(
            phase,
            path.to_path_buf(),
            EventKind::from_io(error.kind()),
            error.to_string(),
        )
    }
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error for {} ({}): {}",
            self.phase,
            self.path.display(),
            self.kind,
            self.cause
        )
    }
}

/// How serious an event is for the run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Skip the affected file or subtree and keep going.
    Recoverable,
    /// Stop the whole run.
    Fatal,
}

/// Policy that turns events into severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Unreadable files and subtrees are skipped.
    #[default]
    SkipAndContinue,
    /// Any unreadable file or subtree cancels the run (`--strict`).
    FailFast,
}

impl ErrorPolicy {
    /// Build the policy from the strict flag.
    #[must_use]
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::FailFast
        } else {
            Self::SkipAndContinue
        }
    }

    /// Classify an event.
    #[must_use]
    pub fn classify(self, _event: &ScanEvent) -> Severity {
        match self {
            Self::SkipAndContinue => Severity::Recoverable,
            Self::FailFast => Severity::Fatal,
        }
    }
}

/// External collector for scan events.
///
/// Implementations decide formatting and destination. Both methods are called
/// concurrently from walker tasks and worker threads.
pub trait EventSink: Send + Sync {
    /// Called for every failure event, with the severity the policy assigned.
    fn on_event(&self, event: &ScanEvent, severity: Severity);

    /// Called when a task failed unexpectedly (a caught panic). The run is
    /// cancelled right after this returns.
    fn on_failure(&self, context: &str, failure: &ScanFailure);
}

/// Sink that forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_event(&self, event: &ScanEvent, severity: Severity) {
        match severity {
            Severity::Recoverable => log::warn!("Skipping: {}", event),
            Severity::Fatal => log::error!("{}", event),
        }
    }

    fn on_failure(&self, context: &str, failure: &ScanFailure) {
        log::error!("Task failed while {}: {}", context, failure);
    }
}

/// Per-run event collector shared by the walker and the worker pool.
///
/// Owns the run's [`CancelToken`]; fatal events and caught panics cancel
/// through it, and only the first cause is kept.
pub struct Reporter {
    sink: Arc<dyn EventSink>,
    policy: ErrorPolicy,
    cancel: CancelToken,
    events: Mutex<Vec<ScanEvent>>,
    subtree_errors: AtomicUsize,
    entry_errors: AtomicUsize,
    file_errors: AtomicUsize,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("policy", &self.policy)
            .field("cancel", &self.cancel)
            .field("subtree_errors", &self.subtree_errors)
            .field("entry_errors", &self.entry_errors)
            .field("file_errors", &self.file_errors)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Create a reporter for one run.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, policy: ErrorPolicy, cancel: CancelToken) -> Self {
        Self {
            sink,
            policy,
            cancel,
            events: Mutex::new(Vec::new()),
            subtree_errors: AtomicUsize::new(0),
            entry_errors: AtomicUsize::new(0),
            file_errors: AtomicUsize::new(0),
        }
    }

    /// Reporter with the log sink and the skip policy, for tests and ad-hoc walks.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(
            Arc::new(LogSink),
            ErrorPolicy::SkipAndContinue,
            CancelToken::new(),
        )
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record a failure covering a whole unit of work: a directory that could
    /// not be listed (Discovery) or a file that could not be read (Hashing).
    /// Forwards it to the sink and applies the policy.
    pub fn report(&self, event: ScanEvent) -> Severity {
        let counter = match event.phase {
            Phase::Discovery => &self.subtree_errors,
            Phase::Hashing => &self.file_errors,
        };
        self.record(event, counter)
    }

    /// Record a failure on a single directory entry (an unreadable entry or a
    /// dangling symlink). The rest of the directory is still walked.
    pub fn report_entry(&self, event: ScanEvent) -> Severity {
        self.record(event, &self.entry_errors)
    }

    fn record(&self, event: ScanEvent, counter: &AtomicUsize) -> Severity {
        let severity = self.policy.classify(&event);
        counter.fetch_add(1, Ordering::Relaxed);
        self.sink.on_event(&event, severity);

        if severity == Severity::Fatal {
            self.fail(ScanFailure::Escalated(event.clone()));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        severity
    }

    /// Cancel the run with `failure`. Returns `false` if an earlier failure
    /// already cancelled it, in which case `failure` is only logged.
    pub fn fail(&self, failure: ScanFailure) -> bool {
        let message = failure.to_string();
        if self.cancel.cancel(failure) {
            log::debug!("Run cancelled: {}", message);
            true
        } else {
            log::debug!("Run already cancelled, dropping later failure: {}", message);
            false
        }
    }

    /// Turn a caught panic into an internal failure and cancel the run.
    pub fn recover(&self, context: &str, payload: Box<dyn Any + Send>) {
        let failure = ScanFailure::Internal {
            context: context.to_string(),
            message: panic_message(payload.as_ref()),
        };
        self.sink.on_failure(context, &failure);
        self.fail(failure);
    }

    /// Snapshot of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of directories that could not be listed.
    #[must_use]
    pub fn subtree_errors(&self) -> usize {
        self.subtree_errors.load(Ordering::Relaxed)
    }

    /// Number of directory entries skipped inside listed directories.
    #[must_use]
    pub fn entry_errors(&self) -> usize {
        self.entry_errors.load(Ordering::Relaxed)
    }

    /// Number of files that could not be read.
    #[must_use]
    pub fn file_errors(&self) -> usize {
        self.file_errors.load(Ordering::Relaxed)
    }
}

/// Extract a readable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingSink {
        events: AtomicUsize,
        failures: AtomicUsize,
    }

    impl EventSink for CountingSink {
        fn on_event(&self, _event: &ScanEvent, _severity: Severity) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _context: &str, _failure: &ScanFailure) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event(phase: Phase) -> ScanEvent {
        ScanEvent::new(
            phase,
            PathBuf::from("/data/x"),
            EventKind::PermissionDenied,
            "denied",
        )
    }

    #[test]
    fn test_event_kind_from_io() {
        assert_eq!(
            EventKind::from_io(io::ErrorKind::NotFound),
            EventKind::NotFound
        );
        assert_eq!(
            EventKind::from_io(io::ErrorKind::PermissionDenied),
            EventKind::PermissionDenied
        );
        assert_eq!(
            EventKind::from_io(io::ErrorKind::UnexpectedEof),
            EventKind::IoFailure
        );
    }

    #[test]
    fn test_event_display() {
        let e = event(Phase::Discovery);
        assert_eq!(
            e.to_string(),
            "discovery error for /data/x (permission denied): denied"
        );
    }

    #[test]
    fn test_recoverable_event_does_not_cancel() {
        let sink = Arc::new(CountingSink::default());
        let reporter = Reporter::new(
            sink.clone(),
            ErrorPolicy::SkipAndContinue,
            CancelToken::new(),
        );

        assert_eq!(reporter.report(event(Phase::Discovery)), Severity::Recoverable);
        assert_eq!(reporter.report(event(Phase::Hashing)), Severity::Recoverable);

        assert!(!reporter.is_cancelled());
        assert_eq!(reporter.subtree_errors(), 1);
        assert_eq!(reporter.file_errors(), 1);
        assert_eq!(reporter.events().len(), 2);
        assert_eq!(sink.events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_entry_events_counted_apart_from_subtrees() {
        let sink = Arc::new(CountingSink::default());
        let reporter = Reporter::new(
            sink.clone(),
            ErrorPolicy::SkipAndContinue,
            CancelToken::new(),
        );

        reporter.report_entry(event(Phase::Discovery));
        reporter.report_entry(event(Phase::Discovery));
        reporter.report(event(Phase::Discovery));

        assert_eq!(reporter.entry_errors(), 2);
        assert_eq!(reporter.subtree_errors(), 1);
        assert_eq!(reporter.file_errors(), 0);
        assert_eq!(reporter.events().len(), 3);
        assert_eq!(sink.events.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_entry_event_escalates_in_strict_mode() {
        let reporter = Reporter::new(
            Arc::new(LogSink),
            ErrorPolicy::FailFast,
            CancelToken::new(),
        );
        assert_eq!(reporter.report_entry(event(Phase::Discovery)), Severity::Fatal);
        assert!(reporter.is_cancelled());
        assert_eq!(reporter.entry_errors(), 1);
    }

    #[test]
    fn test_fail_fast_escalates_first_event_only() {
        let reporter = Reporter::new(
            Arc::new(LogSink),
            ErrorPolicy::FailFast,
            CancelToken::new(),
        );

        let first = event(Phase::Hashing);
        assert_eq!(reporter.report(first.clone()), Severity::Fatal);
        reporter.report(event(Phase::Discovery));

        assert!(reporter.is_cancelled());
        match reporter.cancel_token().cause() {
            Some(ScanFailure::Escalated(e)) => assert_eq!(e, first),
            other => panic!("Expected escalated cause, got {:?}", other),
        }
    }

    #[test]
    fn test_recover_reports_and_cancels() {
        let sink = Arc::new(CountingSink::default());
        let reporter = Reporter::new(
            sink.clone(),
            ErrorPolicy::SkipAndContinue,
            CancelToken::new(),
        );

        let payload = std::panic::catch_unwind(|| {
            panic!("invariant broken");
        })
        .unwrap_err();
        reporter.recover("hashing /a", payload);

        assert_eq!(sink.failures.load(Ordering::SeqCst), 1);
        match reporter.cancel_token().cause() {
            Some(ScanFailure::Internal { context, message }) => {
                assert_eq!(context, "hashing /a");
                assert_eq!(message, "invariant broken");
            }
            other => panic!("Expected internal failure, got {:?}", other),
        }
    }

    #[test]
    fn test_panic_message_variants() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(s.as_ref()), "unknown panic payload");
    }
}
