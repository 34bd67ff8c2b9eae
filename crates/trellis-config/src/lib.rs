//! Shared configuration for the Trellis extension backbone.
//!
//! [`Config`] carries the values every component needs: where extensions are
//! installed, which registry serves their archives, where the lock file
//! lives, which workspace root is reported to language servers, the timeout
//! budgets of the language server orchestrator, and the logging setup,
//! including per-component log levels.
//! Loading configuration from files or command lines is the host's concern;
//! this crate only defines the values, their defaults and their validation.

pub mod defaults;
mod logging;


use std::collections::BTreeMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use logging::{LogComponent, LogFormat, LogFormatParseError, LogLevel};

/// Errors raised when configuration values are unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The registry URL does not parse.
    #[error("registry URL '{url}' is invalid: {message}")]
    InvalidRegistryUrl {
        /// Offending value.
        url: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The registry URL uses a scheme the installer cannot fetch from.
    #[error("registry URL '{url}' uses unsupported scheme '{scheme}'")]
    UnsupportedScheme {
        /// Offending value.
        url: String,
        /// Scheme found in the URL.
        scheme: String,
    },

    /// A timeout was configured as zero.
    #[error("timeout '{name}' must be greater than zero")]
    ZeroTimeout {
        /// Name of the configuration field.
        name: &'static str,
    },
}

/// Runtime configuration shared by the installer, activation engine and
/// language server orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    install_dir: Utf8PathBuf,
    lock_file: Utf8PathBuf,
    registry_url: String,
    workspace_root: Utf8PathBuf,
    initialization_timeout_ms: u64,
    response_timeout_ms: u64,
    http_timeout_ms: u64,
    log_filter: String,
    log_format: LogFormat,
    log_levels: BTreeMap<LogComponent, LogLevel>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_dir: defaults::default_install_dir(),
            lock_file: defaults::default_lock_file(),
            registry_url: defaults::default_registry_url(),
            workspace_root: defaults::default_workspace_root(),
            initialization_timeout_ms: defaults::DEFAULT_INITIALIZATION_TIMEOUT_MS,
            response_timeout_ms: defaults::DEFAULT_RESPONSE_TIMEOUT_MS,
            http_timeout_ms: defaults::DEFAULT_HTTP_TIMEOUT_MS,
            log_filter: defaults::default_log_filter_string(),
            log_format: LogFormat::default(),
            log_levels: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the registry URL is malformed or uses a
    /// scheme other than `http`, `https` or `file`, or when any timeout is
    /// zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.registry_url).map_err(|error| {
            ConfigError::InvalidRegistryUrl {
                url: self.registry_url.clone(),
                message: error.to_string(),
            }
        })?;
        if !matches!(url.scheme(), "http" | "https" | "file") {
            return Err(ConfigError::UnsupportedScheme {
                url: self.registry_url.clone(),
                scheme: url.scheme().to_owned(),
            });
        }

        for (name, value) in [
            ("initialization_timeout_ms", self.initialization_timeout_ms),
            ("response_timeout_ms", self.response_timeout_ms),
            ("http_timeout_ms", self.http_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout { name });
            }
        }
        Ok(())
    }

    /// Directory into which extensions are extracted.
    #[must_use]
    pub fn install_dir(&self) -> &Utf8Path {
        &self.install_dir
    }

    /// Path of the lock file.
    #[must_use]
    pub fn lock_file(&self) -> &Utf8Path {
        &self.lock_file
    }

    /// Registry base URL without a trailing slash.
    #[must_use]
    pub fn registry_url(&self) -> &str {
        self.registry_url.trim_end_matches('/')
    }

    /// Workspace root reported to language servers.
    #[must_use]
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Time a language server gets to answer `initialize`.
    #[must_use]
    pub const fn initialization_timeout(&self) -> Duration {
        Duration::from_millis(self.initialization_timeout_ms)
    }

    /// Time a single language server request may stay unanswered.
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Time an archive download may take.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Log filter expression in `EnvFilter` syntax.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format for log records.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Level set for `component`, if it overrides the base filter.
    #[must_use]
    pub fn log_level(&self, component: LogComponent) -> Option<LogLevel> {
        self.log_levels.get(&component).copied()
    }

    /// Per-component levels, ordered by component.
    #[must_use]
    pub const fn log_levels(&self) -> &BTreeMap<LogComponent, LogLevel> {
        &self.log_levels
    }

    /// Sets the install directory.
    #[must_use]
    pub fn with_install_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }

    /// Sets the lock file path.
    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.lock_file = path.into();
        self
    }

    /// Sets the registry base URL.
    #[must_use]
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Sets the workspace root.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Sets the initialisation timeout.
    #[must_use]
    pub fn with_initialization_timeout(mut self, timeout: Duration) -> Self {
        self.initialization_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Sets the per-request response timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Sets the archive download timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Sets the log filter expression.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Sets the log output format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Overrides the base filter for one component.
    #[must_use]
    pub fn with_log_level(mut self, component: LogComponent, level: LogLevel) -> Self {
        self.log_levels.insert(component, level);
        self
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
