//! Filesystem notifications for the source directories.
//!
//! Wraps a `notify` recommended watcher. Each source is watched
//! non-recursively. Notifications are translated into
//! `(path, is_directory)` pairs and handed to an [`EventIntake`]; nothing
//! here touches file contents.

use crate::organizer::EventIntake;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {}: {reason}", .path.display())]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("None of the source directories exist")]
    NoSources,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// Keeps the notification backend alive. Dropping it stops delivery.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl DirectoryWatcher {
    /// Starts watching every existing directory in `sources`.
    ///
    /// Missing sources are logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot start, a directory cannot be watched, or
    /// no source exists at all.
    pub fn start(sources: &[PathBuf], intake: EventIntake) -> Result<Self, WatchError> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for (path, is_directory) in translate(&event) {
                    intake.on_event(path, is_directory);
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        })?;

        let mut watched = Vec::new();
        for source in sources {
            if !source.is_dir() {
                warn!(path = %source.display(), "source directory missing, not watching");
                continue;
            }
            watcher
                .watch(source, RecursiveMode::NonRecursive)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: source.clone(),
                    reason: e.to_string(),
                })?;
            info!(path = %source.display(), "watching");
            watched.push(source.clone());
        }

        if watched.is_empty() {
            return Err(WatchError::NoSources);
        }

        Ok(Self {
            _watcher: watcher,
            watched,
        })
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

/// Maps a notification to the paths worth queueing.
///
/// Creations and modifications are kept. For renames only the new name
/// matters, since a file renamed into place (a finished download) must be
/// organized under its final name. Removals and access events are dropped.
pub fn translate(event: &Event) -> Vec<(PathBuf, bool)> {
    match &event.kind {
        EventKind::Create(kind) => event
            .paths
            .iter()
            .map(|path| {
                let is_directory = matches!(kind, CreateKind::Folder) || path.is_dir();
                (path.clone(), is_directory)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => {
            let target = match mode {
                RenameMode::To => event.paths.first(),
                RenameMode::Both => event.paths.get(1),
                RenameMode::From => None,
                _ => event.paths.last(),
            };
            target
                .map(|path| vec![(path.clone(), path.is_dir())])
                .unwrap_or_default()
        }
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|path| (path.clone(), path.is_dir()))
            .collect(),
        other => {
            debug!(kind = ?other, "ignoring event");
            Vec::new()
        }
    }
}
