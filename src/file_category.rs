/// File categorization by extension.
///
/// This module maps file names to the category folders they belong in
/// (e.g., "Images", "Documents"). Categories come from configuration as an
/// ordered table; anything the table does not claim lands in [`OTHERS`].
///
/// # Examples
///
/// ```
/// use tidyd::file_category::{CategoryTable, ExtensionClassifier};
///
/// let mut table = CategoryTable::new();
/// table.insert("Images", [".jpg", ".png"]);
/// table.insert("Archives", [".tar.gz", ".zip"]);
///
/// let classifier = ExtensionClassifier::new(table);
/// assert_eq!(classifier.classify("Holiday.JPG"), "Images");
/// assert_eq!(classifier.classify("backup.tar.gz"), "Archives");
/// assert_eq!(classifier.classify("notes"), "Others");
/// ```
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Catch-all category for files no configured category claims.
pub const OTHERS: &str = "Others";

/// Ordered mapping from category name to the extensions it claims.
///
/// Extensions are stored lowercase with a leading dot, so `"JPG"`, `"jpg"`
/// and `".jpg"` all normalize to `".jpg"`. Declaration order is kept: when
/// two categories claim the same extension the first one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    categories: IndexMap<String, IndexSet<String>>,
    /// Whether an entry also claims a file whose whole name equals it, such
    /// as a configured `.gitignore`. Off for the built-in table.
    whole_names: bool,
}

impl CategoryTable {
    /// Creates an empty table. Every file classifies as [`OTHERS`].
    pub fn new() -> Self {
        Self {
            categories: IndexMap::new(),
            whole_names: true,
        }
    }

    /// Adds extensions to a category, creating it if needed.
    pub fn insert<I, S>(&mut self, category: &str, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.categories.entry(category.to_string()).or_default();
        for ext in extensions {
            if let Some(normalized) = normalize_extension(ext.as_ref()) {
                entry.insert(normalized);
            }
        }
    }

    /// Returns true if no category has been declared.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Iterates over declared categories in declaration order.
    pub fn categories(&self) -> impl Iterator<Item = (&str, &IndexSet<String>)> {
        self.categories
            .iter()
            .map(|(name, exts)| (name.as_str(), exts))
    }

    /// Names of every destination folder: the declared categories plus
    /// [`OTHERS`] when it was not declared explicitly.
    pub fn folder_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.categories.keys().map(String::as_str).collect();
        if !self.categories.contains_key(OTHERS) {
            names.push(OTHERS);
        }
        names
    }

    /// Extensions made of more than one dotted segment, such as `.tar.gz`.
    pub fn compound_extensions(&self) -> Vec<String> {
        let mut compound: Vec<String> = self
            .categories
            .values()
            .flatten()
            .filter(|ext| ext.matches('.').count() > 1)
            .cloned()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        compound.sort_by(|a, b| b.len().cmp(&a.len()));
        compound
    }

    /// True when entries also match files named exactly like them.
    pub fn matches_whole_names(&self) -> bool {
        self.whole_names
    }

    /// The built-in table used when nothing is configured.
    ///
    /// Its entries are extensions only: a file named just `.jpg` has no
    /// extension and classifies as [`OTHERS`].
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.whole_names = false;
        table.insert(
            "Images",
            [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".heic"],
        );
        table.insert(
            "Documents",
            [
                ".pdf", ".doc", ".docx", ".txt", ".md", ".rtf", ".odt", ".xlsx", ".xls", ".csv",
                ".pptx", ".ppt",
            ],
        );
        table.insert("Videos", [".mp4", ".mkv", ".avi", ".mov", ".webm"]);
        table.insert("Audio", [".mp3", ".wav", ".flac", ".m4a", ".ogg", ".aac"]);
        table.insert(
            "Archives",
            [".zip", ".rar", ".7z", ".tar", ".gz", ".tar.gz", ".tgz", ".bz2", ".xz"],
        );
        table.insert("Installers", [".exe", ".msi", ".dmg", ".deb", ".rpm", ".appimage"]);
        table
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercases an extension and makes sure it starts with a dot.
fn normalize_extension(ext: &str) -> Option<String> {
    let trimmed = ext.trim();
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with('.') {
        Some(lower)
    } else {
        Some(format!(".{lower}"))
    }
}

/// Case-insensitive `ends_with` that never splits a multi-byte character.
fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    if name.len() < suffix.len() {
        return false;
    }
    let split = name.len() - suffix.len();
    name.is_char_boundary(split) && name[split..].to_lowercase() == suffix
}

/// True when something other than dots precedes `suffix` in `name`.
fn has_stem(name: &str, suffix: &str) -> bool {
    name.get(..name.len() - suffix.len())
        .is_some_and(|stem| !stem.trim_start_matches('.').is_empty())
}

/// Resolves file names to category labels.
///
/// Extension lookup always prefers the longest configured suffix, so
/// `archive.tar.gz` matches `.tar.gz` before `.gz`. The classifier is cheap
/// to clone; the underlying table is shared.
#[derive(Debug, Clone)]
pub struct ExtensionClassifier {
    table: Arc<CategoryTable>,
    /// Extension to owning category, first declaration wins.
    lookup: HashMap<String, String>,
    /// Every known extension, longest first.
    suffixes: Vec<String>,
    whole_names: bool,
    sniff_content: bool,
}

impl ExtensionClassifier {
    /// Builds a classifier over the given table.
    pub fn new(table: CategoryTable) -> Self {
        let mut lookup = HashMap::new();
        for (category, exts) in table.categories() {
            for ext in exts {
                lookup
                    .entry(ext.clone())
                    .or_insert_with(|| category.to_string());
            }
        }

        let mut suffixes: Vec<String> = lookup.keys().cloned().collect();
        // Longest first; ties broken alphabetically so iteration is deterministic.
        suffixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Self {
            whole_names: table.matches_whole_names(),
            table: Arc::new(table),
            lookup,
            suffixes,
            sniff_content: false,
        }
    }

    /// Enables content sniffing for files whose extension is not recognized.
    pub fn with_content_sniffing(mut self, enabled: bool) -> Self {
        self.sniff_content = enabled;
        self
    }

    /// The table this classifier was built from.
    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    /// Maps a file name to its category.
    ///
    /// A suffix only counts as an extension when the name has a stem before
    /// it, with leading dots not counting as a stem. A name that is nothing
    /// but a suffix (`.jpg`, `.gitignore`) is [`OTHERS`] unless the table was
    /// configured explicitly and lists that exact name.
    ///
    /// # Examples
    ///
    /// ```
    /// use tidyd::file_category::{CategoryTable, ExtensionClassifier};
    ///
    /// let mut table = CategoryTable::new();
    /// table.insert("Documents", ["pdf"]);
    /// let classifier = ExtensionClassifier::new(table);
    ///
    /// assert_eq!(classifier.classify("REPORT.PDF"), "Documents");
    /// assert_eq!(classifier.classify(".gitignore"), "Others");
    /// ```
    pub fn classify(&self, file_name: &str) -> &str {
        self.suffixes
            .iter()
            .find(|suffix| {
                ends_with_ignore_case(file_name, suffix)
                    && (self.whole_names || has_stem(file_name, suffix))
            })
            .and_then(|suffix| self.lookup.get(suffix))
            .map(String::as_str)
            .unwrap_or(OTHERS)
    }

    /// Maps a bare extension (with or without the leading dot) to its category.
    pub fn classify_extension(&self, ext: &str) -> &str {
        normalize_extension(ext)
            .and_then(|normalized| self.lookup.get(&normalized))
            .map(String::as_str)
            .unwrap_or(OTHERS)
    }

    /// Classifies a file on disk.
    ///
    /// The extension decides. When it resolves to [`OTHERS`] and content
    /// sniffing is enabled, the file's leading bytes are matched against
    /// known signatures and the detected extension is classified instead.
    pub fn classify_path(&self, path: &Path) -> &str {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        let by_extension = self.classify(&file_name);

        if by_extension != OTHERS || !self.sniff_content {
            return by_extension;
        }

        match infer::get_from_path(path) {
            Ok(Some(kind)) => {
                let by_content = self.classify_extension(kind.extension());
                if by_content != OTHERS {
                    tracing::debug!(
                        path = %path.display(),
                        mime = kind.mime_type(),
                        category = by_content,
                        "category resolved from content"
                    );
                }
                by_content
            }
            _ => OTHERS,
        }
    }
}

impl Default for ExtensionClassifier {
    fn default() -> Self {
        Self::new(CategoryTable::builtin())
    }
}
