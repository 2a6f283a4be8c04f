/// Moving files into category directories.
///
/// This module moves a settled file into `<destination>/<category>/`. It
/// never overwrites: a taken name gets a `_1`, `_2`, … suffix on its stem.
/// Locked files are retried with a fixed backoff, and a move either
/// completes or leaves the source where it was.
use crate::config::MoverConfig;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while moving a file.
#[derive(Debug, Error)]
pub enum MoveError {
    /// The source disappeared before or during the move.
    #[error("{} no longer exists", .path.display())]
    VanishedSource { path: PathBuf },
    /// The source stayed locked for every attempt.
    #[error("{} still locked after {attempts} attempts: {source}", .path.display())]
    TransientAccess {
        path: PathBuf,
        attempts: u32,
        source: io::Error,
    },
    /// Failed to create a category directory.
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreation { path: PathBuf, source: io::Error },
    /// The file name cannot be used as a destination name.
    #[error("Invalid file name: {name:?}")]
    InvalidFileName { name: String },
    /// Any other I/O failure.
    #[error("Failed to move {} to {}: {source}", .from.display(), .to.display())]
    Io {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

impl MoveError {
    /// True when the source was removed or renamed by someone else.
    pub fn is_vanished(&self) -> bool {
        matches!(self, MoveError::VanishedSource { .. })
    }
}

/// Result type for move operations.
pub type MoveResult<T> = Result<T, MoveError>;

/// How long to keep retrying a locked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &MoverConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Runs `op` until it succeeds, fails for a non-transient reason, or the
    /// attempts run out. Sleeps `backoff` between attempts.
    pub fn run<T>(&self, source: &Path, mut op: impl FnMut() -> io::Result<T>) -> MoveResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.kind() == io::ErrorKind::NotFound && !source.exists() => {
                    return Err(MoveError::VanishedSource {
                        path: source.to_path_buf(),
                    });
                }
                Err(e) if is_transient(&e) && attempt < self.max_attempts => {
                    debug!(
                        path = %source.display(),
                        attempt,
                        error = %e,
                        "file locked, retrying"
                    );
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
                Err(e) if is_transient(&e) => {
                    return Err(MoveError::TransientAccess {
                        path: source.to_path_buf(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    return Err(MoveError::Io {
                        from: source.to_path_buf(),
                        to: PathBuf::new(),
                        source: e,
                    });
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&MoverConfig::default())
    }
}

/// Permission-type failures worth waiting out (antivirus scans, browsers
/// still holding the handle).
fn is_transient(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
    ) {
        return true;
    }
    // ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(e.raw_os_error(), Some(32) | Some(33))
}

/// Moves files into category directories under a destination root.
#[derive(Debug, Clone)]
pub struct CollisionSafeMover {
    dest_root: PathBuf,
    /// Multi-dot extensions kept whole when suffixing, longest first.
    compound_extensions: Vec<String>,
    retry: RetryPolicy,
}

impl CollisionSafeMover {
    /// Creates a mover rooted at `dest_root`.
    pub fn new(dest_root: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            dest_root: dest_root.into(),
            compound_extensions: Vec::new(),
            retry,
        }
    }

    /// Keeps the given multi-dot extensions intact when resolving name
    /// collisions, so `a.tar.gz` becomes `a_1.tar.gz` rather than `a.tar_1.gz`.
    pub fn with_compound_extensions(mut self, mut extensions: Vec<String>) -> Self {
        extensions.sort_by(|a, b| b.len().cmp(&a.len()));
        self.compound_extensions = extensions;
        self
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Creates `<dest_root>/<category>` if needed and returns it.
    pub fn ensure_category_dir(&self, category: &str) -> MoveResult<PathBuf> {
        let category_path = self.dest_root.join(category);
        if !category_path.is_dir() {
            fs::create_dir_all(&category_path).map_err(|e| MoveError::DirectoryCreation {
                path: category_path.clone(),
                source: e,
            })?;
            info!(path = %category_path.display(), "directory created");
        }
        Ok(category_path)
    }

    /// First free destination for `file_name` inside `dir`: the name itself,
    /// then `stem_1.ext`, `stem_2.ext`, … checked by existence. The name is
    /// kept byte for byte, including names that are not valid UTF-8.
    pub fn resolve_destination(&self, dir: &Path, file_name: impl AsRef<OsStr>) -> PathBuf {
        let file_name = file_name.as_ref();
        let candidate = dir.join(file_name);
        if is_free(&candidate) {
            return candidate;
        }

        let (stem, ext) = self.split_name(file_name);
        let mut counter: u64 = 1;
        loop {
            let mut name = stem.to_os_string();
            name.push(format!("_{counter}"));
            name.push(ext);
            let candidate = dir.join(name);
            if is_free(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Splits a file name into stem and extension (with its dot).
    fn split_name<'a>(&self, file_name: &'a OsStr) -> (&'a OsStr, &'a OsStr) {
        let bytes = file_name.as_encoded_bytes();
        let ext_len = self
            .compound_extensions
            .iter()
            .find(|ext| {
                bytes.len() > ext.len()
                    && bytes[bytes.len() - ext.len()..].eq_ignore_ascii_case(ext.as_bytes())
            })
            .map(String::len)
            .or_else(|| match bytes.iter().rposition(|&b| b == b'.') {
                Some(0) | None => None,
                Some(idx) => Some(bytes.len() - idx),
            });

        ext_len
            .and_then(|len| split_os_str(file_name, bytes.len() - len))
            .unwrap_or((file_name, OsStr::new("")))
    }

    /// Moves `source` into the directory for `category` under `file_name`,
    /// returning the path the file ended up at.
    ///
    /// # Arguments
    ///
    /// * `source` - The file to move
    /// * `category` - The category folder name under the destination root
    /// * `file_name` - The name to give the file, before collision suffixes
    ///
    /// # Errors
    ///
    /// * `InvalidFileName` if `file_name` is not a single plain path
    ///   component on this platform.
    /// * `VanishedSource` if the source is gone; not retried.
    /// * `TransientAccess` if the file stayed locked for every attempt. The
    ///   source is left untouched.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tidyd::mover::{CollisionSafeMover, RetryPolicy};
    /// use std::path::Path;
    ///
    /// let mover = CollisionSafeMover::new("/home/me/Organized", RetryPolicy::default());
    /// match mover.move_file(Path::new("/home/me/Downloads/cat.jpg"), "Images", "cat.jpg") {
    ///     Ok(dest) => println!("Moved to {}", dest.display()),
    ///     Err(e) => eprintln!("Move failed: {}", e),
    /// }
    /// ```
    pub fn move_file(
        &self,
        source: &Path,
        category: &str,
        file_name: impl AsRef<OsStr>,
    ) -> MoveResult<PathBuf> {
        let file_name = file_name.as_ref();
        if !is_plain_name(file_name) {
            return Err(MoveError::InvalidFileName {
                name: file_name.to_string_lossy().into_owned(),
            });
        }
        if !source.exists() {
            return Err(MoveError::VanishedSource {
                path: source.to_path_buf(),
            });
        }

        let category_dir = self.ensure_category_dir(category)?;

        // The destination is re-resolved on every attempt so a name taken
        // during a backoff is never overwritten. A name taken between the
        // existence check and the move is resolved again without using up
        // an attempt.
        let destination = self
            .retry
            .run(source, || loop {
                let destination = self.resolve_destination(&category_dir, file_name);
                match relocate(source, &destination) {
                    Ok(()) => return Ok(destination),
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        debug!(dst = %destination.display(), "destination taken, trying next name");
                    }
                    Err(e) => return Err(e),
                }
            })
            .map_err(|e| match e {
                MoveError::Io { from, source, .. } => MoveError::Io {
                    from,
                    to: category_dir.join(file_name),
                    source,
                },
                other => other,
            })?;

        info!(
            src = %source.display(),
            dst = %destination.display(),
            category,
            "file moved"
        );
        Ok(destination)
    }
}

/// A name is usable when nothing, not even a dangling link, occupies it.
fn is_free(path: &Path) -> bool {
    fs::symlink_metadata(path).is_err()
}

/// True when `name` is exactly one normal path component, so joining it
/// onto a directory can never leave that directory.
fn is_plain_name(name: &OsStr) -> bool {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => part == name,
        _ => false,
    }
}

#[cfg(unix)]
fn split_os_str(name: &OsStr, mid: usize) -> Option<(&OsStr, &OsStr)> {
    use std::os::unix::ffi::OsStrExt;

    let (stem, ext) = name.as_bytes().split_at(mid);
    Some((OsStr::from_bytes(stem), OsStr::from_bytes(ext)))
}

#[cfg(not(unix))]
fn split_os_str(name: &OsStr, mid: usize) -> Option<(&OsStr, &OsStr)> {
    let name = name.to_str()?;
    if !name.is_char_boundary(mid) {
        return None;
    }
    let (stem, ext) = name.split_at(mid);
    Some((OsStr::new(stem), OsStr::new(ext)))
}

/// Moves `source` to `destination` without ever replacing an existing
/// file. Fails with `AlreadyExists` when the destination is taken.
///
/// On Unix the file is hard-linked into place and the source unlinked,
/// since `rename` would silently replace a file created after the existence
/// check.
/// Filesystems without hard links fall back to `rename`. Moves across
/// filesystems copy into a newly created file and delete the source.
fn relocate(source: &Path, destination: &Path) -> io::Result<()> {
    let placed = if cfg!(unix) {
        link_then_unlink(source, destination)
    } else {
        fs::rename(source, destination)
    };

    match placed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                src = %source.display(),
                dst = %destination.display(),
                "cross-device move, copying"
            );
            copy_then_remove(source, destination)
        }
        Err(e) => Err(e),
    }
}

fn link_then_unlink(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::hard_link(source, destination) {
        Ok(()) => {}
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::AlreadyExists
                    | io::ErrorKind::NotFound
                    | io::ErrorKind::CrossesDevices
            ) =>
        {
            return Err(e);
        }
        Err(e) => {
            debug!(
                src = %source.display(),
                error = %e,
                "hard link unavailable, renaming"
            );
            return fs::rename(source, destination);
        }
    }

    match fs::remove_file(source) {
        Ok(()) => Ok(()),
        // Someone else removed the source name; the content is in place.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            discard_copy(destination);
            Err(e)
        }
    }
}

/// Copies into a freshly created destination and removes the source. On any
/// failure the partial copy is removed so only the source remains.
fn copy_then_remove(source: &Path, destination: &Path) -> io::Result<()> {
    let mut reader = File::open(source)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    drop(writer);
    if let Err(e) = copied {
        discard_copy(destination);
        return Err(e);
    }

    if let Ok(metadata) = reader.metadata() {
        let _ = fs::set_permissions(destination, metadata.permissions());
    }
    drop(reader);

    if let Err(e) = fs::remove_file(source) {
        discard_copy(destination);
        return Err(e);
    }
    Ok(())
}

fn discard_copy(destination: &Path) {
    if let Err(e) = fs::remove_file(destination) {
        warn!(path = %destination.display(), error = %e, "failed to remove partial copy");
    }
}
