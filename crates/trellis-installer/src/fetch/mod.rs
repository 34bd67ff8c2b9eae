//! Archive retrieval from an extension registry.
//!
//! The installer only needs a readable byte stream for a URL, so retrieval
//! sits behind the [`ArchiveFetcher`] trait. [`HttpFetcher`] is the
//! production implementation; [`StaticFetcher`] serves archives from memory
//! for offline mirrors and tests.

mod http;

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

pub use http::HttpFetcher;

/// Failures reported by an [`ArchiveFetcher`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The transport could not reach the registry.
    #[error("unreachable: {message}")]
    Unreachable {
        /// Transport diagnostic.
        message: String,
    },

    /// The registry answered with a non-success status.
    #[error("status {status}")]
    Status {
        /// Status code returned by the registry.
        status: u16,
    },
}

/// Streaming archive source.
pub type ArchiveStream = Box<dyn Read + Send>;

/// Retrieves archive bytes for a URL.
pub trait ArchiveFetcher {
    /// Opens a stream over the archive at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Unreachable`] when the registry cannot be
    /// contacted and [`FetchError::Status`] for non-success responses.
    fn fetch(&self, url: &str) -> Result<ArchiveStream, FetchError>;
}

impl<F: ArchiveFetcher + ?Sized> ArchiveFetcher for &F {
    fn fetch(&self, url: &str) -> Result<ArchiveStream, FetchError> {
        (**self).fetch(url)
    }
}

/// In-memory archive source keyed by URL.
///
/// Unknown URLs answer with status 404. The fetcher counts every call so
/// callers can verify that idempotent installs stay off the network.
///
/// # Example
///
/// ```
/// use trellis_installer::{ArchiveFetcher, StaticFetcher};
///
/// let fetcher = StaticFetcher::new().with_archive("https://r.test/a/1.0.tar.gz", vec![1, 2]);
/// assert!(fetcher.fetch("https://r.test/a/1.0.tar.gz").is_ok());
/// assert!(fetcher.fetch("https://r.test/b/1.0.tar.gz").is_err());
/// assert_eq!(fetcher.fetch_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct StaticFetcher {
    archives: HashMap<String, Vec<u8>>,
    offline: bool,
    fetches: AtomicUsize,
}

impl StaticFetcher {
    /// Creates an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher whose every call fails as unreachable.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    /// Serves `bytes` for `url`.
    #[must_use]
    pub fn with_archive(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.archives.insert(url.into(), bytes);
        self
    }

    /// Adds or replaces the archive served for `url`.
    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.archives.insert(url.into(), bytes);
    }

    /// Number of `fetch` calls made so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ArchiveFetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<ArchiveStream, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(FetchError::Unreachable {
                message: String::from("static fetcher is offline"),
            });
        }
        self.archives
            .get(url)
            .map(|bytes| Box::new(Cursor::new(bytes.clone())) as ArchiveStream)
            .ok_or(FetchError::Status { status: 404 })
    }
}
