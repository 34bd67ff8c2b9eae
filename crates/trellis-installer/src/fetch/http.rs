//! Blocking HTTP archive fetcher.

use std::fs::File;
use std::time::Duration;

use tracing::debug;
use url::Url;

use super::{ArchiveFetcher, ArchiveStream, FetchError};

const FETCH_TARGET: &str = "trellis_installer::fetch";

/// Fetches archives over HTTP(S), or from disk for `file://` registries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Builds a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Unreachable`] when the HTTP client cannot be
    /// constructed (for example when no TLS backend is available).
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trellis/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| FetchError::Unreachable {
                message: error.to_string(),
            })?;
        Ok(Self { client })
    }

    fn fetch_file(url: &Url) -> Result<ArchiveStream, FetchError> {
        let path = url.to_file_path().map_err(|()| FetchError::Unreachable {
            message: format!("'{url}' is not a local file URL"),
        })?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::Status { status: 404 })
            }
            Err(error) => Err(FetchError::Unreachable {
                message: error.to_string(),
            }),
        }
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<ArchiveStream, FetchError> {
        let parsed = Url::parse(url).map_err(|error| FetchError::Unreachable {
            message: format!("invalid archive URL: {error}"),
        })?;
        if parsed.scheme() == "file" {
            return Self::fetch_file(&parsed);
        }

        debug!(target: FETCH_TARGET, url, "requesting archive");
        let response = self
            .client
            .get(parsed)
            .send()
            .map_err(|error| FetchError::Unreachable {
                message: error.to_string(),
            })?;

        let status = response.status();
        debug!(target: FETCH_TARGET, url, status = status.as_u16(), "registry responded");
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        Ok(Box::new(response))
    }
}
