//! Domain errors raised while installing extensions.
//!
//! I/O errors are wrapped in `Arc` so the enum stays small and cloneable for
//! callers that record failures in state tables.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors arising from install, update and uninstall operations.
#[derive(Debug, Clone, Error)]
pub enum InstallError {
    /// The registry could not be reached at all.
    #[error("registry unreachable while fetching {url}: {message}")]
    Network {
        /// Archive URL being fetched.
        url: String,
        /// Transport diagnostic.
        message: String,
    },

    /// The registry answered with a non-success status.
    #[error("registry returned status {status} for {url}")]
    Registry {
        /// Archive URL being fetched.
        url: String,
        /// HTTP status code (or equivalent) reported by the fetcher.
        status: u16,
    },

    /// The archive stream is corrupt or truncated.
    #[error("archive for '{name}' is corrupt: {message}")]
    Archive {
        /// Extension name.
        name: String,
        /// Description of the corruption.
        message: String,
        /// Underlying read error, when there is one.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// A filesystem operation failed.
    #[error("filesystem error at {path}: {source}")]
    Io {
        /// Path being manipulated.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The lock file could not be read, parsed or written.
    #[error("lock file {path} is unusable: {message}")]
    LockFile {
        /// Lock file location.
        path: Utf8PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The extension name cannot be mapped onto the install directory.
    #[error("invalid extension name '{name}': {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// The extension has no lock entry.
    #[error("extension '{name}' is not installed")]
    NotInstalled {
        /// Extension name.
        name: String,
    },
}

impl InstallError {
    /// Returns `true` for failures a caller may retry unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Registry { .. })
    }

    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
