//! Streaming content hasher.
//!
//! # Overview
//! This module provides the [`Hasher`] struct for computing a fixed-size
//! [`Digest`] of a file's full content. Files are read through a fixed
//! 64 KiB buffer, so memory use does not depend on file size. The file handle
//! lives only for the duration of one call and is closed on every exit path.
//!
//! Two algorithms are supported: BLAKE3 (default, 256-bit) and MD5 (128-bit).
//!
//! # Example
//!
//! ```no_run
//! use dupfind::scanner::{ContentHasher, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let digest = hasher.hash(Path::new("Cargo.toml")).unwrap();
//! println!("{digest}");
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use md5::Digest as _;
use serde::{Deserialize, Serialize};

use super::HashError;

/// Size of the read buffer used while streaming file content.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Digest algorithm used to fingerprint file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3, 32-byte digest.
    #[default]
    Blake3,
    /// MD5, 16-byte digest.
    Md5,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blake3 => f.write_str("blake3"),
            Self::Md5 => f.write_str("md5"),
        }
    }
}

/// Fixed-size content digest, tagged with the algorithm that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Digest {
    /// 128-bit MD5 digest.
    Md5([u8; 16]),
    /// 256-bit BLAKE3 digest.
    Blake3([u8; 32]),
}

impl Digest {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Md5(bytes) => bytes,
            Self::Blake3(bytes) => bytes,
        }
    }

    /// The algorithm that produced this digest.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Md5(_) => HashAlgorithm::Md5,
            Self::Blake3(_) => HashAlgorithm::Blake3,
        }
    }

    /// Lowercase hexadecimal rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.algorithm(), self)
    }
}

/// Error parsing a hex digest.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestParseError {
    /// Hex string length matches neither MD5 (32) nor BLAKE3 (64).
    #[error("Invalid digest length: {0} hex characters")]
    InvalidLength(usize),
    /// Non-hex character in the input.
    #[error("Invalid hex character in digest")]
    InvalidHex,
}

fn decode_hex<const N: usize>(s: &str) -> Result<[u8; N], DigestParseError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out).map_err(|_| DigestParseError::InvalidHex)?;
    Ok(out)
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            32 => decode_hex::<16>(s).map(Self::Md5),
            64 => decode_hex::<32>(s).map(Self::Blake3),
            n => Err(DigestParseError::InvalidLength(n)),
        }
    }
}

impl Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of hashing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashedFile {
    /// Content digest.
    pub digest: Digest,
    /// Number of bytes folded into the digest.
    pub len: u64,
}

/// Computes content digests for files.
///
/// Implementations must be usable from many worker threads at once and must
/// never return a digest for a file whose read failed part way.
pub trait ContentHasher: Send + Sync {
    /// Hash the full content of the file at `path`.
    fn hash_file(&self, path: &Path) -> Result<HashedFile, HashError>;

    /// Hash the full content of the file at `path`, returning only the digest.
    fn hash(&self, path: &Path) -> Result<Digest, HashError> {
        self.hash_file(path).map(|h| h.digest)
    }
}

enum Accumulator {
    Md5(md5::Md5),
    Blake3(Box<blake3::Hasher>),
}

impl Accumulator {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(md5::Md5::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Md5(h) => h.update(chunk),
            Self::Blake3(h) => {
                h.update(chunk);
            }
        }
    }

    fn finish(self) -> Digest {
        match self {
            Self::Md5(h) => {
                let mut out = [0u8; 16];
                out.copy_from_slice(&h.finalize());
                Digest::Md5(out)
            }
            Self::Blake3(h) => Digest::Blake3(*h.finalize().as_bytes()),
        }
    }
}

/// Streaming file hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hasher {
    algorithm: HashAlgorithm,
}

impl Hasher {
    /// Create a BLAKE3 hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hasher for the given algorithm.
    #[must_use]
    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// The configured algorithm.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash everything `reader` yields, in fixed-size chunks.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<HashedFile> {
        let mut acc = Accumulator::new(self.algorithm);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut len = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            acc.update(&buffer[..n]);
            len += n as u64;
        }

        Ok(HashedFile {
            digest: acc.finish(),
            len,
        })
    }

    /// Hash an in-memory byte slice.
    #[must_use]
    pub fn hash_bytes(&self, bytes: &[u8]) -> Digest {
        let mut acc = Accumulator::new(self.algorithm);
        acc.update(bytes);
        acc.finish()
    }
}

impl ContentHasher for Hasher {
    fn hash_file(&self, path: &Path) -> Result<HashedFile, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let hashed = self
            .hash_reader(file)
            .map_err(|e| HashError::from_io(path, e))?;
        log::trace!("Hashed {} ({} bytes): {}", path.display(), hashed.len, hashed.digest);
        Ok(hashed)
    }
}
