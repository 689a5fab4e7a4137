//! Thread-safe digest index that detects duplicate groups as hashes arrive.
//!
//! # Overview
//!
//! Every digest moves through three states:
//!
//! 1. *unseen*: no entry
//! 2. *singleton*: exactly one path, the first file with that content
//! 3. *group*: two or more paths, only ever appended to
//!
//! [`DuplicateIndex::observe`] performs the whole check-and-update under one
//! lock, so two workers racing on the same digest can never both create the
//! singleton or both promote it. The promotion to a group happens exactly once
//! per digest.
//!
//! # Example
//!
//! ```
//! use dupfind::duplicates::{DuplicateIndex, GroupUpdate};
//! use dupfind::scanner::Hasher;
//! use std::path::Path;
//!
//! let index = DuplicateIndex::new();
//! let digest = Hasher::new().hash_bytes(b"same");
//!
//! assert_eq!(index.observe(digest, Path::new("/a")), GroupUpdate::NoMatch);
//! assert!(matches!(
//!     index.observe(digest, Path::new("/b")),
//!     GroupUpdate::NewGroup { .. }
//! ));
//! assert_eq!(index.groups().len(), 1);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::scanner::Digest;

/// Outcome of one [`DuplicateIndex::observe`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupUpdate {
    /// First file with this digest; recorded as a singleton.
    NoMatch,
    /// Second distinct file with this digest; the singleton became a group.
    NewGroup {
        /// The path recorded as the singleton
        first: PathBuf,
        /// The path that completed the pair
        second: PathBuf,
    },
    /// The digest already had a group; the path was appended.
    AppendedToGroup,
    /// The path was already recorded under this digest; nothing changed.
    AlreadyRecorded,
}

/// A set of two or more paths with identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Content digest shared by every path
    pub digest: Digest,
    /// Paths in the order their hashing completed
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Always `false` for groups taken from an index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of redundant copies (all but one).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.paths.len().saturating_sub(1)
    }

    /// Whether `path` is a member of this group.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }
}

#[derive(Debug)]
enum Entry {
    Singleton(PathBuf),
    Group(Vec<PathBuf>),
}

/// Digest index shared by every worker of one run.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    entries: Mutex<HashMap<Digest, Entry>>,
}

impl DuplicateIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Digest, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `path` has content `digest`.
    ///
    /// Atomic with respect to every other call on the same index.
    pub fn observe(&self, digest: Digest, path: &Path) -> GroupUpdate {
        let mut entries = self.lock();

        let Some(entry) = entries.get_mut(&digest) else {
            entries.insert(digest, Entry::Singleton(path.to_path_buf()));
            return GroupUpdate::NoMatch;
        };

        match entry {
            Entry::Singleton(first) if first.as_path() == path => GroupUpdate::AlreadyRecorded,
            Entry::Singleton(first) => {
                let first = first.clone();
                let second = path.to_path_buf();
                *entry = Entry::Group(vec![first.clone(), second.clone()]);
                log::debug!("New duplicate group {}: {}", digest, first.display());
                GroupUpdate::NewGroup { first, second }
            }
            Entry::Group(paths) if paths.iter().any(|p| p == path) => GroupUpdate::AlreadyRecorded,
            Entry::Group(paths) => {
                paths.push(path.to_path_buf());
                GroupUpdate::AppendedToGroup
            }
        }
    }

    /// Snapshot of every duplicate group, sorted by digest.
    #[must_use]
    pub fn groups(&self) -> Vec<DuplicateGroup> {
        let entries = self.lock();
        let mut groups: Vec<DuplicateGroup> = entries
            .iter()
            .filter_map(|(digest, entry)| match entry {
                Entry::Group(paths) => Some(DuplicateGroup {
                    digest: *digest,
                    paths: paths.clone(),
                }),
                Entry::Singleton(_) => None,
            })
            .collect();
        groups.sort_by(|a, b| a.digest.cmp(&b.digest));
        groups
    }

    /// Number of digests seen exactly once.
    #[must_use]
    pub fn unique_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| matches!(e, Entry::Singleton(_)))
            .count()
    }

    /// Number of distinct digests seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
