//! Daemon configuration.
//!
//! Configuration is stored in TOML. Every section is optional; anything left
//! out falls back to the defaults shown here:
//!
//! ```toml
//! destination = "~/OrganizedFiles"
//! sources = ["~/Downloads", "~/Desktop"]
//! # categories_file = "~/.config/tidyd/file_types.json"
//!
//! [categories]
//! Images = [".jpg", ".png"]
//! Documents = { text = [".txt", ".md"], office = [".docx", ".xlsx"] }
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = ["desktop.ini", "Thumbs.db"]
//! patterns = []
//! extensions = []
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [batching]
//! batch_interval_secs = 5
//! max_pending = 50
//! tick_interval_ms = 1000
//!
//! [settling]
//! temp_suffixes = [".tmp", ".crdownload", ".part"]
//! stability_delay_ms = 1000
//! max_attempts = 5
//! large_file_threshold = 10485760
//! require_readable = false
//!
//! [mover]
//! max_attempts = 10
//! retry_backoff_ms = 1000
//!
//! [features]
//! detect_duplicates = true
//! sniff_content = false
//! processed_set_limit = 1000
//!
//! [load]
//! high_water_percent = 80.0
//! overload_backoff_secs = 5
//!
//! [logging]
//! default = "info"
//! ```
//!
//! Categories may also come from a separate `categories_file` in JSON (or
//! TOML) with the same shape as the `[categories]` table. A missing or
//! malformed categories file is not fatal: the organizer keeps running and
//! files everything under `Others`.

use crate::file_category::CategoryTable;
use glob::Pattern;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading and filter compilation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML or JSON syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// A category declaration: either a flat extension list or named groups of
/// extensions that are flattened in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryEntry {
    /// `Images = [".jpg", ".png"]`
    Flat(Vec<String>),
    /// `Documents = { text = [".txt"], office = [".docx"] }`
    Nested(IndexMap<String, Vec<String>>),
}

impl CategoryEntry {
    /// All extensions of this entry, groups flattened in order.
    pub fn extensions(&self) -> Vec<&str> {
        match self {
            CategoryEntry::Flat(exts) => exts.iter().map(String::as_str).collect(),
            CategoryEntry::Nested(groups) => groups
                .values()
                .flatten()
                .map(String::as_str)
                .collect(),
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root folder that receives one subdirectory per category.
    pub destination: PathBuf,
    /// Directories to watch (non-recursively).
    pub sources: Vec<PathBuf>,
    /// Optional JSON or TOML file holding the category table.
    pub categories_file: Option<PathBuf>,
    /// Inline category table, in declaration order.
    pub categories: IndexMap<String, CategoryEntry>,
    pub filters: FilterRules,
    pub batching: BatchingConfig,
    pub settling: SettlingConfig,
    pub mover: MoverConfig,
    pub features: FeatureConfig,
    pub load: LoadConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            destination: home.join("OrganizedFiles"),
            sources: vec![home.join("Downloads"), home.join("Desktop")],
            categories_file: None,
            categories: IndexMap::new(),
            filters: FilterRules::default(),
            batching: BatchingConfig::default(),
            settling: SettlingConfig::default(),
            mover: MoverConfig::default(),
            features: FeatureConfig::default(),
            load: LoadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Root-level filter rules applied to incoming events before they are queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default = "default_enable_hidden_files")]
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: default_enable_hidden_files(),
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

fn default_enable_hidden_files() -> bool {
    false
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "desktop.ini", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude, matched against the file name and the full path.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "bak", "log").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Queue cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Minimum seconds between two drains of the pending queue.
    pub batch_interval_secs: u64,
    /// Maximum events released per drain.
    pub max_pending: usize,
    /// How often the worker loop ticks.
    pub tick_interval_ms: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_interval_secs: 5,
            max_pending: 50,
            tick_interval_ms: 1000,
        }
    }
}

impl BatchingConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// When a file counts as finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlingConfig {
    /// Suffixes of in-progress downloads. Matched case-sensitively.
    pub temp_suffixes: Vec<String>,
    /// Delay between two size reads.
    pub stability_delay_ms: u64,
    /// Size changes tolerated before a file is dropped as still writing.
    pub max_attempts: u32,
    /// Files above this many bytes need one extra stable read.
    pub large_file_threshold: u64,
    /// Also require a successful one-byte read before moving.
    pub require_readable: bool,
}

impl Default for SettlingConfig {
    fn default() -> Self {
        Self {
            temp_suffixes: vec![".tmp".into(), ".crdownload".into(), ".part".into()],
            stability_delay_ms: 1000,
            max_attempts: 5,
            large_file_threshold: 10 * 1024 * 1024,
            require_readable: false,
        }
    }
}

impl SettlingConfig {
    pub fn stability_delay(&self) -> Duration {
        Duration::from_millis(self.stability_delay_ms)
    }
}

/// Retry policy for locked files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoverConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_backoff_ms: 1000,
        }
    }
}

/// Optional pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Skip files whose content was already seen during this run.
    pub detect_duplicates: bool,
    /// Sniff file signatures when the extension is unknown.
    pub sniff_content: bool,
    /// Size at which the processed-destination set is cleared.
    pub processed_set_limit: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            detect_duplicates: true,
            sniff_content: false,
            processed_set_limit: 1000,
        }
    }
}

/// System load thresholds for the worker loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// CPU or memory utilization, in percent, above which the loop slows down.
    pub high_water_percent: f32,
    /// Extra sleep per tick while above the high-water mark.
    pub overload_backoff_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            high_water_percent: 80.0,
            overload_backoff_secs: 5,
        }
    }
}

/// Log levels, overridable with `RUST_LOG`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for every target.
    pub default: String,
    /// Per-module overrides, e.g. `tidyd::mover = "debug"`.
    pub modules: IndexMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: "info".to_string(),
            modules: IndexMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.tidydrc.toml` in the current directory
    /// 3. Look for `~/.config/tidyd/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is found but cannot be read
    /// or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".tidydrc.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tidyd").join("config.toml");
            if user_config.exists() {
                return Self::load_from_file(&user_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if TOML parsing fails.
    /// Returns `ConfigError::IoError` if file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and expand `~` in paths.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.expand_paths();
        Ok(config)
    }

    fn expand_paths(&mut self) {
        self.destination = expand_home(&self.destination);
        self.sources = self.sources.iter().map(|p| expand_home(p)).collect();
        self.categories_file = self.categories_file.as_deref().map(expand_home);
    }

    /// Resolve the category table.
    ///
    /// * With a `categories_file`, its categories come first and the inline
    ///   table is appended. A file that cannot be loaded is logged and
    ///   contributes nothing, so classification degrades to `Others`.
    /// * Without one, the inline table is used.
    /// * With neither, the built-in table is used.
    pub fn category_table(&self) -> CategoryTable {
        let mut table = CategoryTable::new();

        if let Some(path) = &self.categories_file {
            match load_category_file(path) {
                Ok(entries) => extend_table(&mut table, &entries),
                Err(e) => tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "category table unavailable, all files will be filed under Others"
                ),
            }
        } else if self.categories.is_empty() {
            return CategoryTable::builtin();
        }

        extend_table(&mut table, &self.categories);
        table
    }

    /// Compile the intake filters.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(self.filters.clone())
    }
}

fn extend_table(table: &mut CategoryTable, entries: &IndexMap<String, CategoryEntry>) {
    for (category, entry) in entries {
        table.insert(category, entry.extensions());
    }
}

/// Reads a category table file. `.json` files are parsed as JSON, anything
/// else as TOML.
pub fn load_category_file(path: &Path) -> Result<IndexMap<String, CategoryEntry>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    } else {
        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }
}

/// Replaces a leading `~` with the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Compiled, optimized filter structures for efficient file matching.
///
/// All glob and regex patterns are compiled once so matching an incoming
/// event costs O(n) in the number of rules, without reparsing.
#[derive(Debug)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Create compiled filters from filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex patterns are invalid.
    pub fn new(rules: FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.into_iter().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Check if a file should be organized (not excluded).
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if Self::matches_any(&self.include_patterns, file_path, &file_name) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if Self::matches_any(&self.exclude_patterns, file_path, &file_name) {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }

    /// Watch events carry absolute paths, so patterns are tried against the
    /// bare file name as well.
    fn matches_any(patterns: &[Pattern], file_path: &Path, file_name: &str) -> bool {
        patterns
            .iter()
            .any(|pattern| pattern.matches(file_name) || pattern.matches_path(file_path))
    }
}

impl Default for CompiledFilters {
    fn default() -> Self {
        Self {
            enable_hidden_files: default_enable_hidden_files(),
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }
}
