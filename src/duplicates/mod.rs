//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Recording digests and detecting duplicate groups as they appear
//! - The pool of hashing workers
//! - Coordinating the walker and the workers for one scan

pub mod finder;
pub mod index;
pub mod pool;

pub use finder::{
    DuplicateFinder, FinderConfig, RunResult, RunState, ScanReport, ScanSummary,
    DEFAULT_QUEUE_CAPACITY,
};
pub use index::{DuplicateGroup, DuplicateIndex, GroupUpdate};
pub use pool::{PoolStats, WorkerPool, MAX_WORKERS};
