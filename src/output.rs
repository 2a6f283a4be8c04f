//! Output formatting and styling module.
//!
//! Everything the daemon prints to the terminal, as opposed to log lines,
//! goes through [`OutputFormatter`]: the startup banner, the category table
//! and the shutdown summary.

use crate::file_category::{CategoryTable, OTHERS};
use crate::stats::StatsSnapshot;
use colored::*;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidyd::output::OutputFormatter;
    /// OutputFormatter::success("Watching 2 directories");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints the active category table, one row per destination folder.
    pub fn category_table(table: &CategoryTable) {
        Self::header("CATEGORIES");

        let width = table
            .folder_names()
            .iter()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        for (category, extensions) in table.categories() {
            let joined: Vec<&str> = extensions.iter().map(String::as_str).collect();
            println!("{:<width$} | {}", category.bold(), joined.join(" "));
        }
        if table.categories().all(|(name, _)| name != OTHERS) {
            println!(
                "{:<width$} | {}",
                OTHERS.bold(),
                "everything else".dimmed()
            );
        }
    }

    /// Prints the shutdown summary: files per category and totals.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidyd::output::OutputFormatter;
    /// use tidyd::stats::StatsSnapshot;
    ///
    /// let mut stats = StatsSnapshot::default();
    /// stats.record("Documents", 2048);
    /// stats.record("Images", 512);
    /// OutputFormatter::summary_table(&stats);
    /// ```
    pub fn summary_table(stats: &StatsSnapshot) {
        Self::header("SUMMARY");

        let max_category_len = stats
            .per_category
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in &stats.per_category {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                file_word(*count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {} ({})",
            "Total".bold(),
            stats.files_processed.to_string().green().bold(),
            file_word(stats.files_processed),
            format_bytes(stats.bytes_processed),
            width = max_category_len
        );
    }
}

fn file_word(count: u64) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Human-readable byte count, e.g. `1.50 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
