//! Path-safe streaming extraction of gzip-compressed tar archives.
//!
//! Every entry is resolved against the destination root before anything is
//! written. Entries with absolute paths or `..` components are skipped with a
//! warning rather than aborting the install. Link entries are never
//! materialised: the extractor has no code path that creates a symlink or a
//! hard link, so an archive cannot plant a link that later writes would
//! follow out of the destination.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use camino::Utf8Path;
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::{debug, warn};

use crate::error::InstallError;

const EXTRACT_TARGET: &str = "trellis_installer::extract";

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Reason an archive entry was not extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The entry path is absolute.
    AbsolutePath,
    /// The entry path climbs out of the destination via `..`.
    ParentTraversal,
    /// The entry is a symbolic or hard link.
    Link,
    /// The entry kind (device, FIFO, ...) is not supported.
    Unsupported,
}

/// An archive entry that was dropped during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Path as recorded in the archive.
    pub path: String,
    /// Why the entry was dropped.
    pub reason: SkipReason,
}

/// Summary of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Number of regular files written.
    pub files: usize,
    /// Number of directories created from directory entries.
    pub directories: usize,
    /// Entries that were dropped.
    pub skipped: Vec<SkippedEntry>,
}

/// Extracts a `.tar.gz` stream into `destination`.
///
/// `name` only labels errors and log records.
///
/// # Errors
///
/// Returns [`InstallError::Archive`] when the compressed stream or the tar
/// structure is corrupt, and [`InstallError::Io`] when writing to the
/// destination fails.
pub fn extract_archive(
    name: &str,
    reader: impl Read,
    destination: &Utf8Path,
) -> Result<ExtractionReport, InstallError> {
    fs::create_dir_all(destination).map_err(|error| InstallError::io(destination, error))?;

    let mut archive = Archive::new(GzDecoder::new(reader));
    let entries = archive
        .entries()
        .map_err(|error| corrupt(name, "unreadable archive header", error))?;

    let mut report = ExtractionReport::default();
    for entry in entries {
        let mut entry = entry.map_err(|error| corrupt(name, "unreadable archive entry", error))?;
        let raw_path = entry
            .path()
            .map_err(|error| corrupt(name, "undecodable entry path", error))?
            .into_owned();
        let display_path = raw_path.display().to_string();

        let relative = match safe_relative_path(&raw_path) {
            Ok(relative) => relative,
            Err(reason) => {
                skip(name, &mut report, display_path, reason);
                continue;
            }
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = destination.as_std_path().join(&relative);
        let entry_type = entry.header().entry_type();

        match entry_type {
            EntryType::Regular | EntryType::Continuous => {
                let mode = entry.header().mode().ok();
                write_file(name, &mut entry, &target)?;
                apply_mode(&target, mode);
                report.files += 1;
            }
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(|error| io_at(&target, error))?;
                report.directories += 1;
            }
            EntryType::Symlink | EntryType::Link => {
                skip(name, &mut report, display_path, SkipReason::Link);
            }
            EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName => {}
            _ => skip(name, &mut report, display_path, SkipReason::Unsupported),
        }
    }

    debug!(
        target: EXTRACT_TARGET,
        extension = name,
        files = report.files,
        directories = report.directories,
        skipped = report.skipped.len(),
        "archive extracted"
    );
    Ok(report)
}

/// Normalises an archive path into a relative path that cannot leave the
/// destination root.
///
/// `.` components are dropped; absolute paths and `..` components are
/// rejected.
pub fn safe_relative_path(path: &Path) -> Result<PathBuf, SkipReason> {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(SkipReason::ParentTraversal),
            Component::RootDir | Component::Prefix(_) => return Err(SkipReason::AbsolutePath),
        }
    }
    Ok(relative)
}

fn write_file(name: &str, entry: &mut impl Read, target: &Path) -> Result<(), InstallError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|error| io_at(parent, error))?;
    }
    let mut file = File::create(target).map_err(|error| io_at(target, error))?;
    let mut buffer = vec![0_u8; COPY_BUFFER_BYTES];
    loop {
        let read = entry
            .read(&mut buffer)
            .map_err(|error| corrupt(name, "truncated entry data", error))?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).unwrap_or_default();
        file.write_all(chunk).map_err(|error| io_at(target, error))?;
    }
    file.flush().map_err(|error| io_at(target, error))
}

#[cfg(unix)]
fn apply_mode(target: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;

    let Some(mode) = mode else {
        return;
    };
    let permissions = if mode & 0o111 == 0 { 0o644 } else { 0o755 };
    if let Err(error) = fs::set_permissions(target, fs::Permissions::from_mode(permissions)) {
        warn!(
            target: EXTRACT_TARGET,
            path = %target.display(),
            error = %error,
            "failed to apply file mode"
        );
    }
}

#[cfg(not(unix))]
fn apply_mode(_target: &Path, _mode: Option<u32>) {}

fn skip(name: &str, report: &mut ExtractionReport, path: String, reason: SkipReason) {
    warn!(
        target: EXTRACT_TARGET,
        extension = name,
        entry = %path,
        ?reason,
        "skipping archive entry"
    );
    report.skipped.push(SkippedEntry { path, reason });
}

fn corrupt(name: &str, message: &str, error: std::io::Error) -> InstallError {
    InstallError::Archive {
        name: name.to_owned(),
        message: format!("{message}: {error}"),
        source: Some(std::sync::Arc::new(error)),
    }
}

fn io_at(path: &Path, error: std::io::Error) -> InstallError {
    InstallError::io(path.to_string_lossy().into_owned(), error)
}
