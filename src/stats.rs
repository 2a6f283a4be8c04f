//! Run statistics and the processed-destination set.
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Counters for one organizer run. Only ever increase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub files_processed: u64,
    pub bytes_processed: u64,
    /// Files moved per category, in the order categories were first used.
    pub per_category: IndexMap<String, u64>,
}

impl StatsSnapshot {
    /// Records one moved file.
    pub fn record(&mut self, category: &str, bytes: u64) {
        self.files_processed += 1;
        self.bytes_processed += bytes;
        *self.per_category.entry(category.to_string()).or_insert(0) += 1;
    }

    /// Compact JSON for the shutdown log line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Destinations produced by successful moves, so a destination is counted
/// in the statistics once.
///
/// Cleared wholesale once it grows past `limit`; clearing only affects
/// accounting, never files on disk.
#[derive(Debug)]
pub struct ProcessedSet {
    paths: HashSet<PathBuf>,
    limit: usize,
}

impl ProcessedSet {
    pub fn new(limit: usize) -> Self {
        Self {
            paths: HashSet::new(),
            limit,
        }
    }

    /// Returns true if the path was not yet recorded.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        let inserted = self.paths.insert(path);
        if self.paths.len() > self.limit {
            tracing::debug!(entries = self.paths.len(), "clearing processed set");
            self.paths.clear();
        }
        inserted
    }

    pub fn contains(&self, path: &std::path::Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
