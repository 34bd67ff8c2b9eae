//! Lock file and per-extension manifest persistence.
//!
//! The lock file is the canonical ledger of what is actually on disk. It is
//! rewritten in full on every change, through a temporary file in the same
//! directory that is renamed over the old one, so a crash mid-write leaves
//! either the previous or the new ledger and never a truncated one.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::InstallError;

const LOCK_TARGET: &str = "trellis_installer::lock";

/// File name of the manifest written into every extension directory.
pub const MANIFEST_FILE_NAME: &str = "extension.json";

/// One installed extension, as recorded in the lock file and in the
/// extension's own manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRecord {
    name: String,
    version: String,
    registry_url: String,
    #[serde(with = "time::serde::rfc3339")]
    installed_at: OffsetDateTime,
}

impl InstalledRecord {
    /// Creates a record stamped with the current UTC time.
    #[must_use]
    pub fn now(
        name: impl Into<String>,
        version: impl Into<String>,
        registry_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            registry_url: registry_url.into(),
            installed_at: OffsetDateTime::now_utc(),
        }
    }

    /// Extension name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Installed version.
    #[must_use]
    pub fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Registry the archive came from.
    #[must_use]
    pub fn registry_url(&self) -> &str {
        self.registry_url.as_str()
    }

    /// When the install completed.
    #[must_use]
    pub const fn installed_at(&self) -> OffsetDateTime {
        self.installed_at
    }

    /// Whether this record describes exactly `(name, version, registry_url)`.
    #[must_use]
    pub fn matches(&self, name: &str, version: &str, registry_url: &str) -> bool {
        self.name == name && self.version == version && self.registry_url == registry_url
    }

    /// Writes this record as the manifest of the extension rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Io`] when the manifest cannot be written.
    pub fn write_manifest(&self, dir: &Utf8Path) -> Result<(), InstallError> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_vec_pretty(self).map_err(|error| {
            InstallError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, error))
        })?;
        fs::write(&path, json).map_err(|error| InstallError::io(&path, error))
    }

    /// Reads the manifest of the extension rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Io`] when the manifest is missing or malformed.
    pub fn read_manifest(dir: &Utf8Path) -> Result<Self, InstallError> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let bytes = fs::read(&path).map_err(|error| InstallError::io(&path, error))?;
        serde_json::from_slice(&bytes).map_err(|error| {
            InstallError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, error))
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockDocument {
    #[serde(with = "time::serde::rfc3339")]
    generated_at: OffsetDateTime,
    #[serde(default)]
    extensions: Vec<InstalledRecord>,
}

/// In-memory view of the lock file, keyed by extension name.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: Utf8PathBuf,
    records: BTreeMap<String, InstalledRecord>,
}

impl LockFile {
    /// Loads the lock file at `path`; a missing file yields an empty lock.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::LockFile`] when the file exists but cannot be
    /// read or parsed.
    pub fn load(path: impl Into<Utf8PathBuf>) -> Result<Self, InstallError> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: LOCK_TARGET, path = %path, "no lock file yet");
                return Ok(Self {
                    path,
                    records: BTreeMap::new(),
                });
            }
            Err(error) => {
                return Err(InstallError::LockFile {
                    path,
                    message: error.to_string(),
                });
            }
        };

        let document: LockDocument =
            serde_json::from_slice(&bytes).map_err(|error| InstallError::LockFile {
                path: path.clone(),
                message: error.to_string(),
            })?;
        let records = document
            .extensions
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();
        Ok(Self { path, records })
    }

    /// Location of the lock file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the record for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&InstalledRecord> {
        self.records.get(name)
    }

    /// Iterates over all records in name order.
    pub fn records(&self) -> impl Iterator<Item = &InstalledRecord> {
        self.records.values()
    }

    /// Number of locked extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when nothing is locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts or replaces the record for its extension, returning the
    /// previous one.
    pub fn upsert(&mut self, record: InstalledRecord) -> Option<InstalledRecord> {
        self.records.insert(record.name.clone(), record)
    }

    /// Removes the record for `name`.
    pub fn remove(&mut self, name: &str) -> Option<InstalledRecord> {
        self.records.remove(name)
    }

    /// Rewrites the lock file in full.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::LockFile`] when serialisation, the temporary
    /// write or the final rename fails.
    pub fn save(&self) -> Result<(), InstallError> {
        let document = LockDocument {
            generated_at: OffsetDateTime::now_utc(),
            extensions: self.records.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&document).map_err(|error| self.failure(&error))?;

        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(parent).map_err(|error| self.failure(&error))?;

        let mut staged = NamedTempFile::new_in(parent).map_err(|error| self.failure(&error))?;
        staged
            .write_all(&json)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|error| self.failure(&error))?;
        staged
            .persist(&self.path)
            .map_err(|error| self.failure(&error.error))?;

        debug!(
            target: LOCK_TARGET,
            path = %self.path,
            extensions = self.records.len(),
            "lock file written"
        );
        Ok(())
    }

    fn failure(&self, error: &dyn std::fmt::Display) -> InstallError {
        InstallError::LockFile {
            path: self.path.clone(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests;
