//! Scanner module for directory traversal and file hashing.
//!
//! This module provides functionality for:
//! - Concurrent directory walking, one task per directory
//! - The bounded file-name queue between the walker and the hashing pool
//! - Streaming content hashing (BLAKE3 or MD5)
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`pending`]: Outstanding-directory counter with completion notification
//! - [`queue`]: Bounded file-name queue with an outstanding-file counter
//! - [`hasher`]: Content digests
//!
//! # Example
//!
//! ```no_run
//! use dupfind::events::Reporter;
//! use dupfind::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default(), Arc::new(Reporter::detached()));
//! let (files, handle) = walker.walk(64).unwrap();
//! for file in files.iter() {
//!     println!("{}", file.path().display());
//! }
//! handle.wait();
//! ```

pub mod hasher;
pub mod pending;
pub mod queue;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::events::{EventKind, Phase, ScanEvent};

// Re-export main types
pub use hasher::{ContentHasher, Digest, HashAlgorithm, HashedFile, Hasher};
pub use pending::PendingWork;
pub use queue::{
    file_queue, FileReceiver, FileSender, QueuedFile, SubmitError, MAX_QUEUE_CAPACITY,
};
pub use walker::{WalkHandle, Walker};

/// Configuration for directory walking.
///
/// Controls filtering and symlink handling.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Warning: May cause infinite loops with symlink cycles.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Skip zero-length files.
    pub skip_empty: bool,

    /// Number of threads running directory tasks (0 = available parallelism).
    pub threads: usize,
}

impl WalkerConfig {
    /// Create a new configuration from CLI arguments.
    #[must_use]
    pub fn new(follow_symlinks: bool, skip_hidden: bool, skip_empty: bool) -> Self {
        Self {
            follow_symlinks,
            skip_hidden,
            skip_empty,
            threads: 0,
        }
    }

    /// Set the number of walker threads.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

/// Errors that can occur while listing a directory.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ScanError {
    /// Permission was denied when accessing a directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while listing a directory.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    /// The walker thread pool could not be started.
    #[error("Failed to start walker threads: {0}")]
    ThreadPool(String),
}

impl ScanError {
    /// Classify an I/O error raised while listing `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(error),
            },
        }
    }

    /// Describe this error as a discovery event.
    #[must_use]
    pub fn to_event(&self) -> ScanEvent {
        match self {
            Self::PermissionDenied(path) => ScanEvent::new(
                Phase::Discovery,
                path.clone(),
                EventKind::PermissionDenied,
                self.to_string(),
            ),
            Self::NotFound(path) => ScanEvent::new(
                Phase::Discovery,
                path.clone(),
                EventKind::NotFound,
                self.to_string(),
            ),
            Self::Io { path, source } => ScanEvent::new(
                Phase::Discovery,
                path.clone(),
                EventKind::IoFailure,
                source.to_string(),
            ),
            Self::ThreadPool(message) => ScanEvent::new(
                Phase::Discovery,
                PathBuf::new(),
                EventKind::IoFailure,
                message.clone(),
            ),
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },
}

impl HashError {
    /// Classify an I/O error raised while opening or reading `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(error),
            },
        }
    }

    /// Describe this error as a hashing event.
    #[must_use]
    pub fn to_event(&self) -> ScanEvent {
        match self {
            Self::NotFound(path) => ScanEvent::new(
                Phase::Hashing,
                path.clone(),
                EventKind::NotFound,
                self.to_string(),
            ),
            Self::PermissionDenied(path) => ScanEvent::new(
                Phase::Hashing,
                path.clone(),
                EventKind::PermissionDenied,
                self.to_string(),
            ),
            Self::Io { path, source } => ScanEvent::new(
                Phase::Hashing,
                path.clone(),
                EventKind::IoFailure,
                source.to_string(),
            ),
        }
    }
}
