//! Log output for Trellis hosts.
//!
//! The installed filter is built from three layers, later layers winning
//! for the same target:
//!
//! 1. the configured base filter,
//! 2. `warn` for the HTTP stack behind the installer, unless the base
//!    filter names that crate itself,
//! 3. the per-component levels from [`Config::log_levels`].

#[cfg(test)]
mod tests;

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, debug, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use trellis_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = "trellis::telemetry";

/// Crates pulled in by registry downloads whose records drown Trellis' own.
const HTTP_STACK: [&str; 4] = ["reqwest", "hyper", "h2", "rustls"];

static INSTALLED_FILTER: OnceCell<String> = OnceCell::new();

/// Proof that the global subscriber is installed.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryHandle {
    filter: &'static str,
}

impl TelemetryHandle {
    /// Filter directives the subscriber was installed with.
    #[must_use]
    pub const fn filter(&self) -> &'static str {
        self.filter
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The combined filter directives do not parse.
    #[error("invalid log filter '{directives}': {message}")]
    Filter {
        /// Directives built from the configuration.
        directives: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber is already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on the first call.
///
/// Later calls return the handle of the first installation, whatever
/// `config` they pass.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the directives do not parse and
/// [`TelemetryError::Subscriber`] when a subscriber from elsewhere is
/// already installed.
///
/// # Examples
///
/// ```rust
/// use trellis::telemetry;
/// use trellis::config::{Config, LogComponent, LogLevel};
///
/// # fn main() -> Result<(), trellis::telemetry::TelemetryError> {
/// let config = Config::default().with_log_level(LogComponent::LanguageServers, LogLevel::Debug);
/// let handle = telemetry::initialise(&config)?;
/// assert!(handle.filter().ends_with("trellis_lsp_host=debug"));
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED_FILTER
        .get_or_try_init(|| install_subscriber(config))
        .map(|filter| TelemetryHandle {
            filter: filter.as_str(),
        })
}

/// Combines the base filter, HTTP stack quieting and component levels
/// into one `EnvFilter` directive string.
#[must_use]
pub fn directives(config: &Config) -> String {
    let base = config.log_filter().trim();
    let mut layers: Vec<String> = Vec::new();
    if !base.is_empty() {
        layers.push(base.to_owned());
    }
    layers.extend(
        HTTP_STACK
            .iter()
            .filter(|dependency| !names_target(base, dependency))
            .map(|dependency| format!("{dependency}=warn")),
    );
    layers.extend(
        config
            .log_levels()
            .iter()
            .map(|(component, level)| format!("{}={level}", component.target())),
    );
    layers.join(",")
}

/// Returns `true` when a directive in `filter` targets `krate` or one of
/// its modules.
fn names_target(filter: &str, krate: &str) -> bool {
    filter.split(',').any(|directive| {
        let target = directive
            .split(['=', '['])
            .next()
            .unwrap_or_default()
            .trim();
        target == krate
            || target
                .strip_prefix(krate)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

fn parse_filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directives).map_err(|error| TelemetryError::Filter {
        directives: directives.to_owned(),
        message: error.to_string(),
    })
}

fn install_subscriber(config: &Config) -> Result<String, TelemetryError> {
    let combined = directives(config);
    let filter = parse_filter(&combined)?;

    let builder = |env_filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_names(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;

    debug!(
        target: TELEMETRY_TARGET,
        filter = %combined,
        format = %config.log_format(),
        "telemetry installed"
    );
    Ok(combined)
}
