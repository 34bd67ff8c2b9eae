//! Idempotent extension installs against a remote registry.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use trellis_config::Config;

use crate::error::InstallError;
use crate::extract::{ExtractionReport, extract_archive};
use crate::fetch::{ArchiveFetcher, FetchError};
use crate::lock::{InstalledRecord, LockFile};

const INSTALL_TARGET: &str = "trellis_installer::installer";

const STAGING_PREFIX: &str = ".staging-";
const BACKUP_PREFIX: &str = ".previous-";

/// Result of a successful [`Installer::install`] or [`Installer::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The requested version was already present; nothing was fetched.
    AlreadyInstalled(InstalledRecord),
    /// The extension was fetched and installed fresh.
    Installed {
        /// Record written to the lock file.
        record: InstalledRecord,
        /// What happened to each archive entry.
        report: ExtractionReport,
    },
    /// A different version was replaced.
    Updated {
        /// Record that was replaced.
        previous: InstalledRecord,
        /// Record written to the lock file.
        record: InstalledRecord,
        /// What happened to each archive entry.
        report: ExtractionReport,
    },
}

impl InstallOutcome {
    /// Lock record describing what is now on disk.
    #[must_use]
    pub const fn record(&self) -> &InstalledRecord {
        match self {
            Self::AlreadyInstalled(record)
            | Self::Installed { record, .. }
            | Self::Updated { record, .. } => record,
        }
    }

    /// Returns `true` when the registry was contacted.
    #[must_use]
    pub const fn fetched(&self) -> bool {
        !matches!(self, Self::AlreadyInstalled(_))
    }
}

/// Fetches, extracts and records extensions under one install directory.
#[derive(Debug)]
pub struct Installer<F> {
    install_dir: Utf8PathBuf,
    registry_url: String,
    lock: LockFile,
    fetcher: F,
}

impl<F: ArchiveFetcher> Installer<F> {
    /// Opens the installer described by `config`, loading its lock file.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::LockFile`] when an existing lock file is
    /// malformed.
    pub fn open(config: &Config, fetcher: F) -> Result<Self, InstallError> {
        Self::new(
            config.install_dir(),
            config.lock_file(),
            config.registry_url(),
            fetcher,
        )
    }

    /// Opens an installer from explicit locations.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::LockFile`] when an existing lock file is
    /// malformed.
    pub fn new(
        install_dir: impl Into<Utf8PathBuf>,
        lock_path: impl Into<Utf8PathBuf>,
        registry_url: impl Into<String>,
        fetcher: F,
    ) -> Result<Self, InstallError> {
        let registry_url: String = registry_url.into();
        Ok(Self {
            install_dir: install_dir.into(),
            registry_url: registry_url.trim_end_matches('/').to_owned(),
            lock: LockFile::load(lock_path)?,
            fetcher,
        })
    }

    /// Installs `name` at `version`.
    ///
    /// When the lock already records exactly this version from this registry
    /// and the directory is present, nothing is fetched. A different locked
    /// version is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Network`] or [`InstallError::Registry`] when
    /// the archive cannot be fetched, [`InstallError::Archive`] when it is
    /// corrupt, and [`InstallError::Io`] or [`InstallError::LockFile`] when
    /// the result cannot be persisted. None of these leave a partially
    /// populated extension directory.
    pub fn install(&mut self, name: &str, version: &str) -> Result<InstallOutcome, InstallError> {
        let destination = self.install_path(name)?;
        if let Some(record) = self.lock.get(name)
            && record.matches(name, version, &self.registry_url)
            && destination.is_dir()
        {
            debug!(
                target: INSTALL_TARGET,
                extension = name,
                version,
                "already installed"
            );
            return Ok(InstallOutcome::AlreadyInstalled(record.clone()));
        }
        self.fetch_and_install(name, version, &destination)
    }

    /// Moves an installed extension to `version`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::NotInstalled`] when `name` has no lock entry,
    /// otherwise the same errors as [`Installer::install`].
    pub fn update(&mut self, name: &str, version: &str) -> Result<InstallOutcome, InstallError> {
        if self.lock.get(name).is_none() {
            return Err(InstallError::NotInstalled {
                name: name.to_owned(),
            });
        }
        self.install(name, version)
    }

    /// Removes an installed extension and its lock entry.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::NotInstalled`] for unknown names and
    /// [`InstallError::Io`] or [`InstallError::LockFile`] when removal fails.
    pub fn uninstall(&mut self, name: &str) -> Result<InstalledRecord, InstallError> {
        let destination = self.install_path(name)?;
        let Some(record) = self.lock.remove(name) else {
            return Err(InstallError::NotInstalled {
                name: name.to_owned(),
            });
        };
        if destination.exists() {
            fs::remove_dir_all(&destination)
                .map_err(|error| InstallError::io(&destination, error))?;
        }
        self.lock.save()?;
        info!(
            target: INSTALL_TARGET,
            extension = name,
            version = record.version(),
            "extension uninstalled"
        );
        Ok(record)
    }

    /// Lock record for `name`, if installed.
    #[must_use]
    pub fn installed(&self, name: &str) -> Option<&InstalledRecord> {
        self.lock.get(name)
    }

    /// Returns `true` when `name` is locked and its directory is present.
    #[must_use]
    pub fn is_installed(&self, name: &str) -> bool {
        self.lock.get(name).is_some()
            && self
                .install_path(name)
                .is_ok_and(|destination| destination.is_dir())
    }

    /// All lock records in name order.
    pub fn records(&self) -> impl Iterator<Item = &InstalledRecord> {
        self.lock.records()
    }

    /// Directory an extension called `name` is installed into.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::InvalidName`] when the name contains empty,
    /// `.` or `..` components, or a backslash.
    pub fn install_path(&self, name: &str) -> Result<Utf8PathBuf, InstallError> {
        Ok(self.install_dir.join(name_path(name)?))
    }

    /// Archive URL for `(name, version)` on the configured registry.
    #[must_use]
    pub fn archive_url(&self, name: &str, version: &str) -> String {
        format!("{}/{name}/{version}.tar.gz", self.registry_url)
    }

    /// Registry this installer fetches from.
    #[must_use]
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// Root of all installed extensions.
    #[must_use]
    pub fn install_dir(&self) -> &Utf8Path {
        &self.install_dir
    }

    /// Fetcher used for registry access.
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn fetch_and_install(
        &mut self,
        name: &str,
        version: &str,
        destination: &Utf8Path,
    ) -> Result<InstallOutcome, InstallError> {
        let url = self.archive_url(name, version);
        debug!(target: INSTALL_TARGET, extension = name, url = %url, "fetching archive");
        let stream = self.fetcher.fetch(&url).map_err(|error| match error {
            FetchError::Unreachable { message } => InstallError::Network {
                url: url.clone(),
                message,
            },
            FetchError::Status { status } => InstallError::Registry {
                url: url.clone(),
                status,
            },
        })?;

        let parent = destination
            .parent()
            .unwrap_or_else(|| self.install_dir.as_path());
        fs::create_dir_all(parent).map_err(|error| InstallError::io(parent, error))?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .map_err(|error| InstallError::io(parent, error))?;
        let staged = utf8_dir(&staging)?;

        let report = extract_archive(name, stream, &staged)?;
        let record = InstalledRecord::now(name, version, self.registry_url.as_str());
        record.write_manifest(&staged)?;
        promote(staging, destination)?;

        let previous = self.lock.upsert(record.clone());
        self.lock.save()?;

        info!(
            target: INSTALL_TARGET,
            extension = name,
            version,
            files = report.files,
            skipped = report.skipped.len(),
            "extension installed"
        );
        Ok(match previous {
            Some(previous) => InstallOutcome::Updated {
                previous,
                record,
                report,
            },
            None => InstallOutcome::Installed { record, report },
        })
    }
}

/// Maps an extension name onto a relative directory path.
fn name_path(name: &str) -> Result<Utf8PathBuf, InstallError> {
    let invalid = |reason| InstallError::InvalidName {
        name: name.to_owned(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    let mut path = Utf8PathBuf::new();
    for component in name.split('/') {
        match component {
            "" => return Err(invalid("empty path component")),
            "." | ".." => return Err(invalid("relative path component")),
            part if part.contains('\\') => return Err(invalid("backslash in name")),
            part if part.starts_with(STAGING_PREFIX) || part.starts_with(BACKUP_PREFIX) => {
                return Err(invalid("reserved name prefix"));
            }
            part => path.push(part),
        }
    }
    Ok(path)
}

fn utf8_dir(dir: &TempDir) -> Result<Utf8PathBuf, InstallError> {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|path| {
        InstallError::io(
            path.to_string_lossy().into_owned(),
            std::io::Error::new(std::io::ErrorKind::InvalidData, "non UTF-8 staging path"),
        )
    })
}

/// Renames the staging directory onto `destination`, moving any existing
/// install aside first and deleting it once the new one is in place.
fn promote(staging: TempDir, destination: &Utf8Path) -> Result<(), InstallError> {
    let backup = if destination.exists() {
        let backup = backup_path(destination);
        if backup.exists() {
            fs::remove_dir_all(&backup).map_err(|error| InstallError::io(&backup, error))?;
        }
        fs::rename(destination, &backup).map_err(|error| InstallError::io(destination, error))?;
        Some(backup)
    } else {
        None
    };

    let staged = staging.keep();
    if let Err(error) = fs::rename(&staged, destination) {
        if let Some(backup) = &backup
            && let Err(restore) = fs::rename(backup, destination)
        {
            warn!(
                target: INSTALL_TARGET,
                path = %destination,
                error = %restore,
                "failed to restore previous install"
            );
        }
        if let Err(cleanup) = fs::remove_dir_all(&staged) {
            warn!(
                target: INSTALL_TARGET,
                path = %staged.display(),
                error = %cleanup,
                "failed to remove staging directory"
            );
        }
        return Err(InstallError::io(destination, error));
    }

    if let Some(backup) = backup
        && let Err(error) = fs::remove_dir_all(&backup)
    {
        warn!(
            target: INSTALL_TARGET,
            path = %backup,
            error = %error,
            "failed to remove previous install"
        );
    }
    Ok(())
}

fn backup_path(destination: &Utf8Path) -> Utf8PathBuf {
    let file_name = destination.file_name().unwrap_or("extension");
    destination.with_file_name(format!("{BACKUP_PREFIX}{file_name}"))
}
