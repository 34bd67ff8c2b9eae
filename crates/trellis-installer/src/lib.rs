//! Registry installer for Trellis extensions.
//!
//! An [`Installer`] fetches `{registry_url}/{name}/{version}.tar.gz` through
//! an [`ArchiveFetcher`], extracts it with path-safety checks into a staging
//! directory, moves the result into `{install_dir}/{name}` and records the
//! install in a lock file. Installs are idempotent: a version that is already
//! locked and present on disk is never fetched again.
//!
//! ```no_run
//! use trellis_config::Config;
//! use trellis_installer::{HttpFetcher, Installer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let fetcher = HttpFetcher::new(config.http_timeout())?;
//! let mut installer = Installer::open(&config, fetcher)?;
//! let outcome = installer.install("zig", "1.2.0")?;
//! println!("{} is at {}", outcome.record().name(), outcome.record().version());
//! # Ok(())
//! # }
//! ```

mod error;
mod extract;
mod fetch;
mod installer;
mod lock;

#[cfg(test)]
mod test_support;

pub use error::InstallError;
pub use extract::{ExtractionReport, SkipReason, SkippedEntry, extract_archive, safe_relative_path};
pub use fetch::{ArchiveFetcher, ArchiveStream, FetchError, HttpFetcher, StaticFetcher};
pub use installer::{InstallOutcome, Installer};
pub use lock::{InstalledRecord, LockFile, MANIFEST_FILE_NAME};
