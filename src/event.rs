//! Filesystem notifications as seen by the organizer.
//!
//! The watcher adapter turns each raw notification into a [`WatchEvent`];
//! everything downstream works with this concrete type only.
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// A single "created" or "modified" notification for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// The path the notification was raised for.
    pub path: PathBuf,
    /// Whether the path referred to a directory when the event was raised.
    pub is_directory: bool,
    /// When the organizer received the notification.
    pub observed_at: DateTime<Utc>,
}

impl WatchEvent {
    /// Creates an event stamped with the current time.
    pub fn new(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            is_directory,
            observed_at: Utc::now(),
        }
    }

    /// Returns the final path component for display, replacing invalid
    /// UTF-8 lossily. Moves use the raw name from the path.
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}
