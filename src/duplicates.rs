//! Content-based duplicate detection.
//!
//! Files are identified by the SHA-256 digest of their full content. The
//! digest is used for identity only; it carries no integrity guarantee.
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const CHUNK_SIZE: usize = 64 * 1024;

/// Remembers content digests seen during this run.
#[derive(Debug, Default)]
pub struct DuplicateContentFilter {
    /// Digest to the first path seen with that content.
    seen: HashMap<String, PathBuf>,
    /// Path to the digest it most recently introduced.
    introduced: HashMap<PathBuf, String>,
}

impl DuplicateContentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a file with identical content was seen before.
    /// Otherwise records the digest as introduced by `path`.
    ///
    /// Reads the whole file; this blocks for as long as the read takes.
    pub fn is_duplicate(&mut self, path: &Path) -> io::Result<bool> {
        let digest = content_hash(path)?;
        if self.seen.contains_key(&digest) {
            return Ok(true);
        }
        self.seen.insert(digest.clone(), path.to_path_buf());
        self.introduced.insert(path.to_path_buf(), digest);
        Ok(false)
    }

    /// Drops the digest most recently introduced by `path`, e.g. after its
    /// move failed and the file should count as new on the next
    /// notification. Digests of earlier files that lived at the same path
    /// are kept.
    pub fn forget(&mut self, path: &Path) {
        let Some(digest) = self.introduced.remove(path) else {
            return;
        };
        if self.seen.get(&digest).is_some_and(|seen_path| seen_path == path) {
            self.seen.remove(&digest);
        }
    }

    /// Number of distinct contents recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Hex SHA-256 of a file, streamed in fixed-size chunks.
pub fn content_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
