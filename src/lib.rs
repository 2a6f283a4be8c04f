//! tidyd - keeps download folders tidy
//!
//! This library watches source directories (typically Downloads and Desktop),
//! waits for new files to finish writing, classifies them by extension, and
//! moves them into per-category folders under a destination root without
//! ever overwriting an existing file. Files with content already seen during
//! the run can be left in place.

pub mod batcher;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod event;
pub mod file_category;
pub mod load;
pub mod logging;
pub mod mover;
pub mod organizer;
pub mod output;
pub mod settling;
pub mod stats;
pub mod watcher;

pub use batcher::EventBatcher;
pub use config::{CompiledFilters, Config, ConfigError};
pub use duplicates::DuplicateContentFilter;
pub use event::WatchEvent;
pub use file_category::{CategoryTable, ExtensionClassifier, OTHERS};
pub use mover::{CollisionSafeMover, MoveError};
pub use organizer::{EventIntake, Organizer, TickReport};
pub use settling::{PendingFile, Readiness, SettlingDetector, SkipReason};
pub use stats::StatsSnapshot;
pub use watcher::DirectoryWatcher;

pub use cli::{Args, run_cli};
