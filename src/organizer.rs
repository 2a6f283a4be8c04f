//! The organizer: ties queueing, settling, classification, duplicate
//! detection and moving together.
//!
//! [`Organizer`] owns all mutable state and lives on a single worker
//! thread. Notification threads only get an [`EventIntake`], which filters
//! and enqueues without touching the disk. The worker calls
//! [`Organizer::tick`] on a fixed cadence, or earlier when the intake signals
//! that a drain is due.

use crate::batcher::EventBatcher;
use crate::config::{CompiledFilters, Config, ConfigError};
use crate::duplicates::DuplicateContentFilter;
use crate::event::WatchEvent;
use crate::file_category::{CategoryTable, ExtensionClassifier};
use crate::mover::{CollisionSafeMover, MoveError, MoveResult, RetryPolicy};
use crate::settling::{PendingFile, Readiness, SettlingDetector, SkipReason, has_temp_suffix};
use crate::stats::{ProcessedSet, StatsSnapshot};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cheap checks run on the notification thread before an event is queued.
#[derive(Debug)]
struct IntakeFilter {
    filters: CompiledFilters,
    temp_suffixes: Vec<String>,
    dest_root: PathBuf,
}

impl IntakeFilter {
    fn accepts(&self, path: &Path, is_directory: bool) -> bool {
        !is_directory
            && !has_temp_suffix(path, &self.temp_suffixes)
            && !path.starts_with(&self.dest_root)
            && self.filters.should_include(path)
    }
}

/// Thread-safe handle for delivering watch notifications.
///
/// Cloning is cheap. `on_event` never reads the file and holds the queue
/// lock only for the push.
#[derive(Debug, Clone)]
pub struct EventIntake {
    batcher: Arc<Mutex<EventBatcher>>,
    filter: Arc<IntakeFilter>,
    wake: Sender<()>,
}

impl EventIntake {
    /// Filters and enqueues one notification. Returns false if it was
    /// filtered out.
    pub fn on_event(&self, path: PathBuf, is_directory: bool) -> bool {
        if !self.filter.accepts(&path, is_directory) {
            return false;
        }

        let due = {
            let mut batcher = self.batcher.lock();
            batcher.enqueue(WatchEvent::new(path, is_directory));
            batcher.is_due()
        };
        if due {
            // A full channel already holds a pending wake-up.
            let _ = self.wake.try_send(());
        }
        true
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Events released by the batcher.
    pub drained: usize,
    pub moved: usize,
    pub duplicates: usize,
    /// Events or files dropped by the settling checks.
    pub skipped: usize,
    pub failed: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

enum Outcome {
    Moved,
    Duplicate,
    Failed,
}

/// Watches nothing by itself; processes the events it is given.
#[derive(Debug)]
pub struct Organizer {
    batcher: Arc<Mutex<EventBatcher>>,
    filter: Arc<IntakeFilter>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    detector: SettlingDetector,
    settling: Vec<PendingFile>,
    classifier: ExtensionClassifier,
    duplicates: Option<DuplicateContentFilter>,
    mover: CollisionSafeMover,
    stats: StatsSnapshot,
    processed: ProcessedSet,
}

impl Organizer {
    /// Builds an organizer that files into `config.destination` using the
    /// given category table. The start time is now.
    ///
    /// # Errors
    ///
    /// Returns an error if the intake filters do not compile.
    pub fn new(config: &Config, table: CategoryTable) -> Result<Self, ConfigError> {
        let started_at = Utc::now();
        let compound = table.compound_extensions();
        let classifier =
            ExtensionClassifier::new(table).with_content_sniffing(config.features.sniff_content);
        let mover = CollisionSafeMover::new(
            config.destination.clone(),
            RetryPolicy::from_config(&config.mover),
        )
        .with_compound_extensions(compound);

        let filter = IntakeFilter {
            filters: config.compile_filters()?,
            temp_suffixes: config.settling.temp_suffixes.clone(),
            dest_root: config.destination.clone(),
        };
        let (wake_tx, wake_rx) = bounded(1);

        Ok(Self {
            batcher: Arc::new(Mutex::new(EventBatcher::from_config(&config.batching))),
            filter: Arc::new(filter),
            wake_tx,
            wake_rx,
            detector: SettlingDetector::new(&config.settling, started_at),
            settling: Vec::new(),
            classifier,
            duplicates: config
                .features
                .detect_duplicates
                .then(DuplicateContentFilter::new),
            mover,
            stats: StatsSnapshot::default(),
            processed: ProcessedSet::new(config.features.processed_set_limit),
        })
    }

    /// Overrides the start time. Files created before it are never moved.
    pub fn with_start_time(mut self, started_at: DateTime<Utc>) -> Self {
        self.detector = self.detector.with_started_at(started_at);
        self
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.detector.started_at()
    }

    /// A handle for notification threads.
    pub fn intake(&self) -> EventIntake {
        EventIntake {
            batcher: Arc::clone(&self.batcher),
            filter: Arc::clone(&self.filter),
            wake: self.wake_tx.clone(),
        }
    }

    /// Receives a message whenever an intake finds a drain due.
    pub fn wake_signal(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }

    pub fn classifier(&self) -> &ExtensionClassifier {
        &self.classifier
    }

    pub fn destination(&self) -> &Path {
        self.mover.dest_root()
    }

    /// Creates the destination root and one folder per category plus
    /// `Others`. Failing to create the root is fatal for the caller.
    pub fn prepare_destination(&self) -> MoveResult<()> {
        let root = self.mover.dest_root();
        if !root.is_dir() {
            fs::create_dir_all(root).map_err(|e| MoveError::DirectoryCreation {
                path: root.to_path_buf(),
                source: e,
            })?;
            info!(path = %root.display(), "directory created");
        }
        for folder in self.classifier.table().folder_names() {
            self.mover.ensure_category_dir(folder)?;
        }
        Ok(())
    }

    /// Single-threaded entry point: filter, enqueue, then try a drain right
    /// away so a quiet system makes progress without waiting for the host.
    pub fn on_event(&mut self, path: impl Into<PathBuf>, is_directory: bool) -> TickReport {
        if !self.intake().on_event(path.into(), is_directory) {
            return TickReport::default();
        }
        self.tick()
    }

    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now())
    }

    /// Drains due events into the settling list, re-checks settling files,
    /// and moves the ones that are ready.
    pub fn tick_at(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        let drained = self.batcher.lock().drain_due_at(now);
        report.drained = drained.len();

        for event in drained {
            if self.settling.iter().any(|pending| pending.path == event.path) {
                debug!(path = %event.path.display(), "already settling");
                continue;
            }
            match self.detector.admit(&event, now) {
                Ok(pending) => self.settling.push(pending),
                Err(reason) => {
                    log_settling_skip(&event.path, &reason);
                    report.skipped += 1;
                }
            }
        }

        let mut waiting = Vec::with_capacity(self.settling.len());
        for mut pending in std::mem::take(&mut self.settling) {
            match self.detector.check(&mut pending, now) {
                Readiness::Wait => waiting.push(pending),
                Readiness::Skip(reason) => {
                    log_settling_skip(&pending.path, &reason);
                    report.skipped += 1;
                }
                Readiness::Ready => match self.process(&pending.path) {
                    Outcome::Moved => report.moved += 1,
                    Outcome::Duplicate => report.duplicates += 1,
                    Outcome::Failed => report.failed += 1,
                },
            }
        }
        self.settling = waiting;

        report
    }

    /// Classify, check for duplicate content, move, account. Every error is
    /// logged here and never escapes.
    fn process(&mut self, source: &Path) -> Outcome {
        let Some(file_name) = source.file_name() else {
            warn!(src = %source.display(), reason = "no file name", "move failed");
            return Outcome::Failed;
        };
        let category = self.classifier.classify_path(source).to_string();

        if let Some(duplicates) = self.duplicates.as_mut() {
            match duplicates.is_duplicate(source) {
                Ok(true) => {
                    info!(path = %source.display(), "duplicate skipped");
                    return Outcome::Duplicate;
                }
                Ok(false) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log_settling_skip(source, &SkipReason::Vanished);
                    return Outcome::Failed;
                }
                Err(e) => {
                    debug!(path = %source.display(), error = %e, "could not hash file, moving anyway");
                }
            }
        }

        match self.mover.move_file(source, &category, file_name) {
            Ok(destination) => {
                let bytes = fs::metadata(&destination).map(|m| m.len()).unwrap_or(0);
                if self.processed.insert(destination) {
                    self.stats.record(&category, bytes);
                }
                Outcome::Moved
            }
            Err(e) => {
                if let Some(duplicates) = self.duplicates.as_mut() {
                    duplicates.forget(source);
                }
                warn!(src = %source.display(), reason = %e, "move failed");
                Outcome::Failed
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> &StatsSnapshot {
        &self.stats
    }

    /// Events queued and not yet drained.
    pub fn pending_len(&self) -> usize {
        self.batcher.lock().pending_len()
    }

    /// Files admitted and waiting to settle.
    pub fn settling_len(&self) -> usize {
        self.settling.len()
    }
}

fn log_settling_skip(path: &Path, reason: &SkipReason) {
    match reason {
        SkipReason::PreExisting | SkipReason::Directory | SkipReason::TempFile => {
            debug!(path = %path.display(), reason = %reason, "settling skipped")
        }
        _ => info!(path = %path.display(), reason = %reason, "settling skipped"),
    }
}
