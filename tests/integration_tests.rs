/// Integration tests for tidyd
///
/// These tests simulate real-world usage: files land in a watched folder,
/// notifications arrive, and the organizer files them under the destination.
///
/// Test categories:
/// 1. Basic organization workflows
/// 2. Name collisions
/// 3. Settling and skipped files
/// 4. Duplicate detection
/// 5. Configuration and filtering
/// 6. Batching and statistics
/// 7. Real-world scenarios
use chrono::{Duration as ChronoDuration, Utc};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tidyd::config::{BatchingConfig, Config, MoverConfig, SettlingConfig};
use tidyd::{DirectoryWatcher, Organizer};

// ============================================================================
// Test Utilities
// ============================================================================

/// A test fixture with a watched `downloads/` folder and an `organized/`
/// destination inside one temporary directory.
struct TestFixture {
    temp_dir: TempDir,
    organizer: Organizer,
}

impl TestFixture {
    /// Create a fixture with the built-in categories and no waiting.
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a fixture after letting `adjust` tweak the instant config.
    fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(temp_dir.path().join("downloads")).expect("Failed to create source");

        let mut config = instant_config(temp_dir.path());
        adjust(&mut config);

        let organizer = Organizer::new(&config, config.category_table())
            .expect("Failed to build organizer")
            .with_start_time(Utc::now() - ChronoDuration::hours(1));

        TestFixture {
            temp_dir,
            organizer,
        }
    }

    fn source(&self) -> PathBuf {
        self.temp_dir.path().join("downloads")
    }

    fn organized(&self) -> PathBuf {
        self.temp_dir.path().join("organized")
    }

    /// Create a file with content in the watched folder.
    fn create_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let file_path = self.source().join(name);
        let mut file = File::create(&file_path).expect("Failed to create file");
        file.write_all(content)
            .expect("Failed to write file content");
        file_path
    }

    /// Create a file and deliver its creation notification.
    fn drop_file(&mut self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.create_file(name, content);
        self.organizer.on_event(&path, false);
        path
    }

    /// Assert that a file exists under the destination.
    fn assert_organized(&self, rel_path: &str) {
        let path = self.organized().join(rel_path);
        assert!(
            path.exists() && path.is_file(),
            "File should be organized: {}",
            path.display()
        );
    }

    /// Assert that a file is still in the watched folder.
    fn assert_in_source(&self, name: &str) {
        let path = self.source().join(name);
        assert!(path.is_file(), "File should stay in place: {}", path.display());
    }

    fn assert_not_in_source(&self, name: &str) {
        let path = self.source().join(name);
        assert!(!path.exists(), "File should have moved: {}", path.display());
    }

    /// List all organized files, relative to the destination.
    fn list_organized(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        Self::walk_dir(&self.organized(), &mut files);
        let root = self.organized();
        let mut relative: Vec<PathBuf> = files
            .into_iter()
            .filter_map(|path| path.strip_prefix(&root).ok().map(Path::to_path_buf))
            .collect();
        relative.sort();
        relative
    }

    fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    files.push(path);
                } else if path.is_dir() {
                    Self::walk_dir(&path, files);
                }
            }
        }
    }
}

/// Config for `root` with every delay set to zero.
fn instant_config(root: &Path) -> Config {
    Config {
        destination: root.join("organized"),
        sources: vec![root.join("downloads")],
        batching: BatchingConfig {
            batch_interval_secs: 0,
            ..BatchingConfig::default()
        },
        settling: SettlingConfig {
            stability_delay_ms: 0,
            ..SettlingConfig::default()
        },
        mover: MoverConfig {
            retry_backoff_ms: 0,
            ..MoverConfig::default()
        },
        ..Config::default()
    }
}

// ============================================================================
// Test Data: Realistic File Content
// ============================================================================

/// PNG file header (minimal, just enough to be detected as PNG)
const PNG_HEADER: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1 image
    0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // bit depth, color
    0xDE,
];

/// JPEG file header (minimal)
const JPEG_HEADER: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, // JPEG SOI and APP0 marker
    0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, // JFIF signature
    0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00,
];

/// PDF file header (minimal)
const PDF_HEADER: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

/// ZIP file header (minimal)
const ZIP_HEADER: &[u8] = &[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x00, 0x00];

// ============================================================================
// Test Suite 1: Basic Organization
// ============================================================================

#[test]
fn test_single_image_is_filed() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("photo.jpg", JPEG_HEADER);

    fixture.assert_organized("Images/photo.jpg");
    fixture.assert_not_in_source("photo.jpg");
}

#[test]
fn test_mixed_file_types() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("report.pdf", PDF_HEADER);
    fixture.drop_file("song.mp3", b"ID3");
    fixture.drop_file("clip.mkv", b"matroska");
    fixture.drop_file("setup.exe", b"MZ");

    fixture.assert_organized("Documents/report.pdf");
    fixture.assert_organized("Audio/song.mp3");
    fixture.assert_organized("Videos/clip.mkv");
    fixture.assert_organized("Installers/setup.exe");
}

#[test]
fn test_compound_extension_goes_to_archives() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("report.tar.gz", b"gzip bytes");

    fixture.assert_organized("Archives/report.tar.gz");
}

#[test]
fn test_unknown_and_missing_extensions_go_to_others() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("notes.xyz", b"?");
    fixture.drop_file("README", b"plain");

    fixture.assert_organized("Others/notes.xyz");
    fixture.assert_organized("Others/README");
}

#[test]
fn test_mixed_case_extension() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("SCAN.PDF", PDF_HEADER);

    fixture.assert_organized("Documents/SCAN.PDF");
}

#[test]
fn test_content_preserved() {
    let mut fixture = TestFixture::new();
    let content = b"The quick brown fox jumps over the lazy dog";
    fixture.drop_file("story.txt", content);

    let moved = fs::read(fixture.organized().join("Documents/story.txt")).unwrap();
    assert_eq!(moved, content);
}

#[test]
fn test_special_characters_in_filename() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("résumé (final) [v2].pdf", PDF_HEADER);

    fixture.assert_organized("Documents/résumé (final) [v2].pdf");
}

#[test]
fn test_prepare_destination_creates_category_folders() {
    let fixture = TestFixture::new();
    fixture.organizer.prepare_destination().unwrap();

    for folder in [
        "Images",
        "Documents",
        "Videos",
        "Audio",
        "Archives",
        "Installers",
        "Others",
    ] {
        assert!(
            fixture.organized().join(folder).is_dir(),
            "{folder} should exist"
        );
    }
}

// ============================================================================
// Test Suite 2: Name Collisions
// ============================================================================

#[test]
fn test_same_name_twice_gets_counter_suffix() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("photo.jpg", b"first photo");
    fixture.drop_file("photo.jpg", b"second photo");

    fixture.assert_organized("Images/photo.jpg");
    fixture.assert_organized("Images/photo_1.jpg");
    assert_eq!(
        fs::read(fixture.organized().join("Images/photo.jpg")).unwrap(),
        b"first photo"
    );
    assert_eq!(
        fs::read(fixture.organized().join("Images/photo_1.jpg")).unwrap(),
        b"second photo"
    );
}

#[test]
fn test_existing_destination_file_never_overwritten() {
    let mut fixture = TestFixture::new();
    let images = fixture.organized().join("Images");
    fs::create_dir_all(&images).unwrap();
    fs::write(images.join("photo.jpg"), b"already here").unwrap();
    fs::write(images.join("photo_1.jpg"), b"also here").unwrap();

    fixture.drop_file("photo.jpg", b"new arrival");

    assert_eq!(fs::read(images.join("photo.jpg")).unwrap(), b"already here");
    assert_eq!(fs::read(images.join("photo_1.jpg")).unwrap(), b"also here");
    assert_eq!(fs::read(images.join("photo_2.jpg")).unwrap(), b"new arrival");
}

#[test]
fn test_compound_extension_collision_keeps_extension_whole() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("backup.tar.gz", b"one");
    fixture.drop_file("backup.tar.gz", b"two");

    fixture.assert_organized("Archives/backup.tar.gz");
    fixture.assert_organized("Archives/backup_1.tar.gz");
}

// ============================================================================
// Test Suite 3: Settling and Skipped Files
// ============================================================================

#[test]
fn test_pre_existing_file_not_moved() {
    let fixture = TestFixture::new();
    let path = fixture.create_file("old-invoice.pdf", PDF_HEADER);

    let mut organizer = fixture
        .organizer
        .with_start_time(Utc::now() + ChronoDuration::hours(1));
    let report = organizer.on_event(&path, false);

    assert_eq!(report.skipped, 1);
    assert!(path.exists());
    assert_eq!(organizer.stats().files_processed, 0);
}

#[test]
fn test_in_progress_downloads_not_moved() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("movie.mp4.crdownload", b"partial");
    fixture.drop_file("archive.zip.part", b"partial");
    fixture.drop_file("draft.tmp", b"partial");

    fixture.assert_in_source("movie.mp4.crdownload");
    fixture.assert_in_source("archive.zip.part");
    fixture.assert_in_source("draft.tmp");
    assert!(fixture.list_organized().is_empty());
}

#[test]
fn test_download_renamed_into_place_is_moved() {
    let mut fixture = TestFixture::new();
    let partial = fixture.drop_file("movie.mp4.crdownload", b"video bytes");

    let finished = fixture.source().join("movie.mp4");
    fs::rename(&partial, &finished).unwrap();
    fixture.organizer.on_event(&finished, false);

    fixture.assert_organized("Videos/movie.mp4");
}

#[test]
fn test_directory_events_ignored() {
    let mut fixture = TestFixture::new();
    let folder = fixture.source().join("album");
    fs::create_dir(&folder).unwrap();

    assert!(fixture.organizer.on_event(&folder, true).is_idle());
    // A directory reported without the flag is still caught by the stat.
    let report = fixture.organizer.on_event(&folder, false);
    assert_eq!(report.skipped, 1);
    assert!(folder.is_dir());
}

#[test]
fn test_vanished_file_is_skipped() {
    let mut fixture = TestFixture::new();
    let path = fixture.create_file("gone.pdf", PDF_HEADER);
    fs::remove_file(&path).unwrap();

    let report = fixture.organizer.on_event(&path, false);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
}

#[test]
fn test_duplicate_notification_moves_once() {
    let mut fixture = TestFixture::new();
    let path = fixture.create_file("report.pdf", PDF_HEADER);

    let intake = fixture.organizer.intake();
    intake.on_event(path.clone(), false);
    intake.on_event(path.clone(), false);
    fixture.organizer.tick();

    intake.on_event(path.clone(), false);
    fixture.organizer.tick();

    assert_eq!(
        fixture.list_organized(),
        vec![PathBuf::from("Documents/report.pdf")]
    );
    assert_eq!(fixture.organizer.stats().files_processed, 1);
}

#[test]
fn test_file_waits_for_stability_delay() {
    let mut fixture = TestFixture::with_config(|config| {
        config.settling.stability_delay_ms = 1000;
    });
    let path = fixture.create_file("scan.pdf", PDF_HEADER);
    let start = Instant::now();
    fixture.organizer.intake().on_event(path.clone(), false);

    let report = fixture.organizer.tick_at(start);
    assert_eq!(report.moved, 0);
    assert!(path.exists());

    let report = fixture.organizer.tick_at(start + Duration::from_millis(1000));
    assert_eq!(report.moved, 1);
    fixture.assert_organized("Documents/scan.pdf");
}

// ============================================================================
// Test Suite 4: Duplicate Detection
// ============================================================================

#[test]
fn test_duplicate_content_left_in_place() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("a.pdf", b"identical");
    let report_path = fixture.create_file("copy of a.pdf", b"identical");
    let report = fixture.organizer.on_event(&report_path, false);

    assert_eq!(report.duplicates, 1);
    fixture.assert_organized("Documents/a.pdf");
    fixture.assert_in_source("copy of a.pdf");
}

#[test]
fn test_duplicate_detection_disabled_moves_everything() {
    let mut fixture = TestFixture::with_config(|config| {
        config.features.detect_duplicates = false;
    });
    fixture.drop_file("a.pdf", b"identical");
    fixture.drop_file("b.pdf", b"identical");

    fixture.assert_organized("Documents/a.pdf");
    fixture.assert_organized("Documents/b.pdf");
}

#[test]
fn test_same_name_same_content_is_duplicate() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("photo.jpg", JPEG_HEADER);
    fixture.drop_file("photo.jpg", JPEG_HEADER);

    assert_eq!(
        fixture.list_organized(),
        vec![PathBuf::from("Images/photo.jpg")]
    );
    fixture.assert_in_source("photo.jpg");
}

// ============================================================================
// Test Suite 5: Configuration and Filtering
// ============================================================================

#[test]
fn test_hidden_files_excluded_by_default() {
    let mut fixture = TestFixture::new();
    fixture.drop_file(".DS_Store", b"mac");

    fixture.assert_in_source(".DS_Store");
}

#[test]
fn test_exclude_rules() {
    let mut fixture = TestFixture::with_config(|config| {
        config.filters.exclude.extensions = vec!["log".to_string()];
        config.filters.exclude.filenames = vec!["desktop.ini".to_string()];
        config.filters.exclude.patterns = vec!["*.keep.*".to_string()];
    });
    fixture.drop_file("server.log", b"log");
    fixture.drop_file("desktop.ini", b"ini");
    fixture.drop_file("notes.keep.txt", b"keep");
    fixture.drop_file("notes.txt", b"move");

    fixture.assert_in_source("server.log");
    fixture.assert_in_source("desktop.ini");
    fixture.assert_in_source("notes.keep.txt");
    fixture.assert_organized("Documents/notes.txt");
}

#[test]
fn test_inline_categories_replace_builtin_table() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let root = temp_dir.path();
    fs::create_dir(root.join("downloads")).unwrap();

    let toml = format!(
        r#"
destination = '{dest}'
sources = ['{src}']

[categories]
Pictures = [".jpg", "PNG"]
Code = {{ rust = [".rs"], python = [".py"] }}

[batching]
batch_interval_secs = 0

[settling]
stability_delay_ms = 0
"#,
        dest = root.join("organized").display(),
        src = root.join("downloads").display()
    );
    let config = Config::from_toml_str(&toml).unwrap();
    let mut organizer = Organizer::new(&config, config.category_table())
        .unwrap()
        .with_start_time(Utc::now() - ChronoDuration::hours(1));

    for (name, content) in [
        ("photo.jpg", JPEG_HEADER),
        ("icon.png", PNG_HEADER),
        ("main.rs", b"fn main() {}".as_slice()),
        ("script.py", b"print()".as_slice()),
        ("report.pdf", PDF_HEADER),
    ] {
        let path = root.join("downloads").join(name);
        fs::write(&path, content).unwrap();
        organizer.on_event(&path, false);
    }

    let organized = root.join("organized");
    assert!(organized.join("Pictures/photo.jpg").is_file());
    assert!(organized.join("Pictures/icon.png").is_file());
    assert!(organized.join("Code/main.rs").is_file());
    assert!(organized.join("Code/script.py").is_file());
    // Not declared anywhere.
    assert!(organized.join("Others/report.pdf").is_file());
}

#[test]
fn test_categories_file_json() {
    let mut fixture = TestFixture::with_config(|config| {
        let file = config.destination.with_file_name("file_types.json");
        fs::write(
            &file,
            r#"{ "Ebooks": [".epub", ".mobi"], "Images": { "raster": [".jpg"] } }"#,
        )
        .unwrap();
        config.categories_file = Some(file);
    });
    fixture.drop_file("novel.epub", b"epub");
    fixture.drop_file("photo.jpg", JPEG_HEADER);
    fixture.drop_file("report.pdf", PDF_HEADER);

    fixture.assert_organized("Ebooks/novel.epub");
    fixture.assert_organized("Images/photo.jpg");
    fixture.assert_organized("Others/report.pdf");
}

#[test]
fn test_missing_categories_file_files_everything_under_others() {
    let mut fixture = TestFixture::with_config(|config| {
        config.categories_file = Some(config.destination.with_file_name("missing.json"));
    });
    fixture.drop_file("photo.jpg", JPEG_HEADER);
    fixture.drop_file("report.pdf", PDF_HEADER);

    fixture.assert_organized("Others/photo.jpg");
    fixture.assert_organized("Others/report.pdf");
}

#[test]
fn test_content_sniffing_for_unknown_extension() {
    let mut fixture = TestFixture::with_config(|config| {
        config.features.sniff_content = true;
    });
    fixture.drop_file("download", PNG_HEADER);
    fixture.drop_file("archive.bin", ZIP_HEADER);

    fixture.assert_organized("Images/download");
    fixture.assert_organized("Archives/archive.bin");
}

#[test]
fn test_config_file_round_trip_through_loader() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
destination = '/srv/sorted'
sources = ['/srv/inbox']

[features]
detect_duplicates = false
"#,
    )
    .unwrap();

    let config = Config::load(Some(&config_path)).unwrap();
    assert_eq!(config.destination, PathBuf::from("/srv/sorted"));
    assert_eq!(config.sources, vec![PathBuf::from("/srv/inbox")]);
    assert!(!config.features.detect_duplicates);
    assert_eq!(config.batching.max_pending, 50);
}

// ============================================================================
// Test Suite 6: Batching and Statistics
// ============================================================================

#[test]
fn test_burst_drains_in_bounded_batches() {
    let mut fixture = TestFixture::with_config(|config| {
        config.batching.batch_interval_secs = 5;
    });
    let intake = fixture.organizer.intake();
    for n in 0..120 {
        let path = fixture.create_file(&format!("file_{n:03}.txt"), format!("{n}").as_bytes());
        intake.on_event(path, false);
    }
    assert_eq!(fixture.organizer.pending_len(), 120);

    let start = Instant::now();
    let first = fixture.organizer.tick_at(start + Duration::from_secs(5));
    assert_eq!(first.drained, 50);
    assert_eq!(first.moved, 50);

    let second = fixture.organizer.tick_at(start + Duration::from_secs(10));
    assert_eq!(second.drained, 50);

    let third = fixture.organizer.tick_at(start + Duration::from_secs(15));
    assert_eq!(third.drained, 20);
    assert_eq!(fixture.organizer.pending_len(), 0);
    assert_eq!(fixture.organizer.stats().files_processed, 120);
}

#[test]
fn test_stats_count_files_bytes_and_categories() {
    let mut fixture = TestFixture::new();
    fixture.drop_file("a.jpg", b"1234");
    fixture.drop_file("b.jpg", b"123456");
    fixture.drop_file("c.pdf", b"12");

    let stats = fixture.organizer.stats();
    assert_eq!(stats.files_processed, 3);
    assert_eq!(stats.bytes_processed, 12);
    assert_eq!(stats.per_category.get("Images"), Some(&2));
    assert_eq!(stats.per_category.get("Documents"), Some(&1));

    let json: serde_json::Value = serde_json::from_str(&stats.to_json()).unwrap();
    assert_eq!(json["files_processed"], 3);
}

// ============================================================================
// Test Suite 7: Real-world Scenarios
// ============================================================================

#[test]
fn test_downloads_folder_simulation() {
    let mut fixture = TestFixture::new();
    let files: &[(&str, &[u8])] = &[
        ("wallpaper.png", PNG_HEADER),
        ("photo.jpg", JPEG_HEADER),
        ("ebook.pdf", PDF_HEADER),
        ("paper.pdf", b"%PDF-1.7 other"),
        ("installer.zip", ZIP_HEADER),
        ("backup.tar.gz", b"tarball"),
        ("song.mp3", b"ID3 audio"),
        ("setup.dmg", b"disk image"),
        ("Chrome.crdownload", b"partial"),
    ];
    for (name, content) in files {
        fixture.drop_file(name, content);
    }

    assert_eq!(
        fixture.list_organized(),
        vec![
            PathBuf::from("Archives/backup.tar.gz"),
            PathBuf::from("Archives/installer.zip"),
            PathBuf::from("Audio/song.mp3"),
            PathBuf::from("Documents/ebook.pdf"),
            PathBuf::from("Documents/paper.pdf"),
            PathBuf::from("Images/photo.jpg"),
            PathBuf::from("Images/wallpaper.png"),
            PathBuf::from("Installers/setup.dmg"),
        ]
    );
    fixture.assert_in_source("Chrome.crdownload");
}

#[test]
fn test_live_watcher_files_new_download() {
    let mut fixture = TestFixture::new();
    let _watcher = DirectoryWatcher::start(&[fixture.source()], fixture.organizer.intake())
        .expect("Failed to start watcher");

    fixture.create_file("live.pdf", PDF_HEADER);

    let deadline = Instant::now() + Duration::from_secs(10);
    let target = fixture.organized().join("Documents/live.pdf");
    while !target.exists() && Instant::now() < deadline {
        fixture.organizer.tick();
        std::thread::sleep(Duration::from_millis(50));
    }

    fixture.assert_organized("Documents/live.pdf");
    fixture.assert_not_in_source("live.pdf");
}
