//! Readiness checks for freshly observed files.
//!
//! A browser download or an archive extraction produces a burst of events
//! while the file is still growing. Moving it then would break the writer,
//! so every event goes through two stages:
//!
//! 1. [`SettlingDetector::admit`] rejects events that can never be moved
//!    (directories, temp suffixes, vanished paths, files older than the
//!    organizer) and records the current size.
//! 2. [`SettlingDetector::check`] is called on later ticks. The file is
//!    ready once its size stayed the same across consecutive reads spaced
//!    `stability_delay` apart. The wait lives in [`PendingFile`] rather than
//!    in a sleeping thread.

use crate::config::SettlingConfig;
use crate::event::WatchEvent;
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::{self, File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Why an event was dropped without moving the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The event refers to a directory.
    Directory,
    /// The path still carries an in-progress download suffix.
    TempFile,
    /// The path no longer exists.
    Vanished,
    /// The file was created before the organizer started.
    PreExisting,
    /// The size kept changing past the retry bound.
    StillWriting,
    /// The file exists but could not be inspected.
    Inaccessible(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Directory => write!(f, "is a directory"),
            SkipReason::TempFile => write!(f, "temporary download file"),
            SkipReason::Vanished => write!(f, "file no longer exists"),
            SkipReason::PreExisting => write!(f, "file predates organizer start"),
            SkipReason::StillWriting => write!(f, "file still being written"),
            SkipReason::Inaccessible(reason) => write!(f, "cannot inspect file: {reason}"),
        }
    }
}

/// Outcome of a stability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Safe to move now.
    Ready,
    /// Check again on a later tick.
    Wait,
    /// Drop the file for good.
    Skip(SkipReason),
}

/// A file waiting to settle.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub path: PathBuf,
    pub observed_at: DateTime<Utc>,
    last_size: u64,
    attempts: u32,
    stable_reads: u32,
    next_check: Instant,
}

impl PendingFile {
    /// Size seen at the latest read.
    pub fn last_size(&self) -> u64 {
        self.last_size
    }

    /// Number of size changes seen so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the next read is due.
    pub fn next_check(&self) -> Instant {
        self.next_check
    }
}

/// Decides whether observed files are finished.
#[derive(Debug, Clone)]
pub struct SettlingDetector {
    started_at: DateTime<Utc>,
    temp_suffixes: Vec<String>,
    stability_delay: Duration,
    max_attempts: u32,
    large_file_threshold: u64,
    require_readable: bool,
}

impl SettlingDetector {
    /// Creates a detector. Files created before `started_at` are never admitted.
    pub fn new(config: &SettlingConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            temp_suffixes: config.temp_suffixes.clone(),
            stability_delay: config.stability_delay(),
            max_attempts: config.max_attempts,
            large_file_threshold: config.large_file_threshold,
            require_readable: config.require_readable,
        }
    }

    /// Same checks, different start time.
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// True if the path ends with one of the temp suffixes (case-sensitive).
    pub fn is_temp_path(&self, path: &Path) -> bool {
        has_temp_suffix(path, &self.temp_suffixes)
    }

    /// First-stage checks, run once per drained event.
    pub fn admit(&self, event: &WatchEvent, now: Instant) -> Result<PendingFile, SkipReason> {
        if event.is_directory {
            return Err(SkipReason::Directory);
        }
        if self.is_temp_path(&event.path) {
            return Err(SkipReason::TempFile);
        }

        let metadata = stat(&event.path)?;
        if metadata.is_dir() {
            return Err(SkipReason::Directory);
        }

        if let Some(created) = creation_time(&metadata)
            && created < self.started_at
        {
            return Err(SkipReason::PreExisting);
        }

        Ok(PendingFile {
            path: event.path.clone(),
            observed_at: event.observed_at,
            last_size: metadata.len(),
            attempts: 0,
            stable_reads: 0,
            next_check: now + self.stability_delay,
        })
    }

    /// Re-reads the file if its check is due.
    pub fn check(&self, pending: &mut PendingFile, now: Instant) -> Readiness {
        if now < pending.next_check {
            return Readiness::Wait;
        }

        let metadata = match stat(&pending.path) {
            Ok(metadata) => metadata,
            Err(reason) => return Readiness::Skip(reason),
        };
        let size = metadata.len();

        let unchanged = size == pending.last_size
            && (!self.require_readable || is_readable(&pending.path));

        if unchanged {
            pending.stable_reads += 1;
            if pending.stable_reads >= self.required_stable_reads(size) {
                return Readiness::Ready;
            }
        } else {
            pending.attempts += 1;
            pending.stable_reads = 0;
            pending.last_size = size;
            if pending.attempts > self.max_attempts {
                return Readiness::Skip(SkipReason::StillWriting);
            }
        }

        pending.next_check = now + self.stability_delay;
        Readiness::Wait
    }

    /// Large files get one extra settle period for slow flushes.
    fn required_stable_reads(&self, size: u64) -> u32 {
        if size > self.large_file_threshold { 2 } else { 1 }
    }
}

/// Checks a path against a list of temp suffixes.
pub(crate) fn has_temp_suffix(path: &Path, suffixes: &[String]) -> bool {
    let name = path.to_string_lossy();
    suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
}

fn stat(path: &Path) -> Result<Metadata, SkipReason> {
    fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SkipReason::Vanished,
        _ => SkipReason::Inaccessible(e.to_string()),
    })
}

/// Birth time where the platform records it, modification time otherwise.
fn creation_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// A one-byte read succeeds (or the file is empty).
fn is_readable(path: &Path) -> bool {
    let mut buf = [0u8; 1];
    File::open(path)
        .and_then(|mut file| file.read(&mut buf))
        .is_ok()
}
