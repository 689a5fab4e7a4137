//! Error handling: skipped subtrees and files, strict mode, internal failures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dupfind::duplicates::{DuplicateFinder, FinderConfig, RunResult};
use dupfind::error::{ExitCode, ScanFailure};
use dupfind::events::{EventKind, EventSink, Phase, ScanEvent, Severity};
use dupfind::scanner::{ContentHasher, HashError, HashedFile, Hasher};
use dupfind::signal::CancelToken;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// Delegates to the real hasher except for one path.
struct InjectedHasher {
    target: PathBuf,
    fault: Fault,
}

enum Fault {
    ReadError,
    Panic,
}

impl ContentHasher for InjectedHasher {
    fn hash_file(&self, path: &Path) -> Result<HashedFile, HashError> {
        if path == self.target {
            match self.fault {
                Fault::ReadError => {
                    return Err(HashError::from_io(
                        path,
                        io::Error::new(io::ErrorKind::UnexpectedEof, "simulated short read"),
                    ))
                }
                Fault::Panic => panic!("unexpected absent digest state"),
            }
        }
        Hasher::new().hash_file(path)
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(ScanEvent, Severity)>>,
    failures: AtomicUsize,
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: &ScanEvent, severity: Severity) {
        self.events.lock().unwrap().push((event.clone(), severity));
    }

    fn on_failure(&self, _context: &str, _failure: &ScanFailure) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

fn fixture() -> (TempDir, PathBuf, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let one = write(dir.path(), "a/1.txt", "x");
    let two = write(dir.path(), "a/b/2.txt", "x");
    let three = write(dir.path(), "c/3.txt", "x");
    (dir, one, two, three)
}

#[test]
fn test_simulated_read_failure_is_skipped() {
    let (dir, one, two, three) = fixture();
    let sink = Arc::new(RecordingSink::default());
    let finder = DuplicateFinder::new(FinderConfig::default().with_workers(3))
        .with_hasher(Arc::new(InjectedHasher {
            target: two.clone(),
            fault: Fault::ReadError,
        }))
        .with_event_sink(sink.clone());

    let report = match finder.run(dir.path()) {
        RunResult::Completed(report) => report,
        RunResult::Cancelled(cause) => panic!("Expected completion, got {}", cause),
    };

    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert!(group.contains(&one));
    assert!(group.contains(&three));
    assert!(!group.contains(&two));

    assert_eq!(report.summary.file_errors, 1);
    assert_eq!(report.summary.files_hashed, 2);
    assert_eq!(report.exit_code(), ExitCode::PartialSuccess);

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    let (event, severity) = &events[0];
    assert_eq!(event.phase, Phase::Hashing);
    assert_eq!(event.kind, EventKind::IoFailure);
    assert_eq!(event.path, two);
    assert_eq!(*severity, Severity::Recoverable);
}

#[test]
fn test_strict_mode_cancels_on_read_failure() {
    let (dir, _one, two, _three) = fixture();
    let finder = DuplicateFinder::new(FinderConfig::default().with_strict(true)).with_hasher(
        Arc::new(InjectedHasher {
            target: two.clone(),
            fault: Fault::ReadError,
        }),
    );

    match finder.run(dir.path()) {
        RunResult::Cancelled(ScanFailure::Escalated(event)) => {
            assert_eq!(event.path, two);
            assert_eq!(event.phase, Phase::Hashing);
        }
        other => panic!("Expected escalated failure, got {:?}", other),
    }
}

#[test]
fn test_panic_becomes_internal_failure() {
    let (dir, one, _two, _three) = fixture();
    let sink = Arc::new(RecordingSink::default());
    let cancel = CancelToken::new();
    let finder = DuplicateFinder::new(FinderConfig::default().with_workers(2))
        .with_hasher(Arc::new(InjectedHasher {
            target: one,
            fault: Fault::Panic,
        }))
        .with_event_sink(sink.clone());

    match finder.run_with_cancel(dir.path(), &cancel) {
        RunResult::Cancelled(ScanFailure::Internal { context, message }) => {
            assert!(context.starts_with("hashing "));
            assert_eq!(message, "unexpected absent digest state");
        }
        other => panic!("Expected internal failure, got {:?}", other),
    }
    assert_eq!(sink.failures.load(Ordering::SeqCst), 1);
    assert!(cancel.is_cancelled());
}

#[test]
fn test_first_cause_wins() {
    let (dir, ..) = fixture();
    let cancel = CancelToken::new();
    assert!(cancel.cancel(ScanFailure::Interrupted));
    assert!(!cancel.cancel(ScanFailure::Internal {
        context: "later".to_string(),
        message: "ignored".to_string(),
    }));

    let result = DuplicateFinder::with_defaults().run_with_cancel(dir.path(), &cancel);
    match result {
        RunResult::Cancelled(cause) => {
            assert!(matches!(cause, ScanFailure::Interrupted));
            assert_eq!(cause.exit_code(), ExitCode::Interrupted);
        }
        RunResult::Completed(_) => panic!("Expected cancellation"),
    }
}

#[test]
fn test_root_that_is_a_file_fails_immediately() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "plain.txt", "x");

    match DuplicateFinder::with_defaults().run(&file) {
        RunResult::Cancelled(ScanFailure::RootUnreadable { path, .. }) => assert_eq!(path, file),
        other => panic!("Expected RootUnreadable, got {:?}", other),
    }
}

#[cfg(unix)]
mod permissions {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// chmod has no effect for root; such environments skip these tests.
    fn denied(path: &Path) -> bool {
        fs::read_dir(path).is_err()
    }

    #[test]
    fn test_permission_denied_subtree_is_skipped() {
        let dir = TempDir::new().unwrap();
        let one = write(dir.path(), "open/1.txt", "x");
        let two = write(dir.path(), "sibling/deep/2.txt", "x");
        write(dir.path(), "locked/3.txt", "x");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if !denied(&locked) {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            eprintln!("Skipping: running with permission override");
            return;
        }

        let sink = Arc::new(RecordingSink::default());
        let result = DuplicateFinder::with_defaults()
            .with_event_sink(sink.clone())
            .run(dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let report = match result {
            RunResult::Completed(report) => report,
            RunResult::Cancelled(cause) => panic!("Expected completion, got {}", cause),
        };
        assert_eq!(report.groups.len(), 1);
        let group = &report.groups[0];
        assert_eq!(group.len(), 2);
        assert!(group.contains(&one) && group.contains(&two));
        assert_eq!(report.summary.subtree_errors, 1);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0.phase, Phase::Discovery);
        assert_eq!(events[0].0.kind, EventKind::PermissionDenied);
        assert_eq!(events[0].0.path, locked);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a", "x");
        write(dir.path(), "b", "x");
        let secret = write(dir.path(), "c", "x");
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::File::open(&secret).is_ok() {
            eprintln!("Skipping: running with permission override");
            return;
        }

        let report = DuplicateFinder::with_defaults()
            .run(dir.path())
            .into_result()
            .unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].len(), 2);
        assert!(!report.groups[0].contains(&secret));
        assert_eq!(report.summary.file_errors, 1);
        assert_eq!(report.summary.events[0].kind, EventKind::PermissionDenied);
    }

    #[test]
    fn test_unreadable_root_fails_immediately() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o000)).unwrap();

        if !denied(&root) {
            fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
            eprintln!("Skipping: running with permission override");
            return;
        }

        let result = DuplicateFinder::with_defaults().run(&root);
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(
            result,
            RunResult::Cancelled(ScanFailure::RootUnreadable { .. })
        ));
    }

    #[test]
    fn test_strict_mode_cancels_on_denied_subtree() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "open/1.txt", "x");
        write(dir.path(), "locked/2.txt", "x");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if !denied(&locked) {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            eprintln!("Skipping: running with permission override");
            return;
        }

        let result = DuplicateFinder::new(FinderConfig::default().with_strict(true)).run(dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        match result {
            RunResult::Cancelled(ScanFailure::Escalated(event)) => {
                assert_eq!(event.phase, Phase::Discovery);
                assert_eq!(event.kind, EventKind::PermissionDenied);
            }
            other => panic!("Expected escalated failure, got {:?}", other),
        }
    }
}
