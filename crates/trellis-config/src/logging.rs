//! Logging settings: output format and per-component verbosity.
//!
//! Each Trellis crate logs under its own crate-name target, so a
//! [`LogComponent`] maps one-to-one onto a tracing target prefix. Hosts
//! combine the base filter with per-component levels when they install
//! their subscriber.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record, for editors that collect logs.
    Json,
    /// Single-line text for interactive editor sessions.
    #[default]
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`], [`LogComponent`] or
/// [`LogLevel`] from text.
pub type LogFormatParseError = strum::ParseError;

/// A part of Trellis whose verbosity can be tuned on its own.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogComponent {
    /// Registry downloads, archive extraction and the lock file.
    Installer,
    /// Trigger dispatch and extension loading.
    Activation,
    /// Language server sessions and their protocol traffic.
    LanguageServers,
    /// The host that wires the other components together.
    Host,
}

impl LogComponent {
    /// Every component, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Installer,
        Self::Activation,
        Self::LanguageServers,
        Self::Host,
    ];

    /// Tracing target prefix of the component's log records.
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::Installer => "trellis_installer",
            Self::Activation => "trellis_activation",
            Self::LanguageServers => "trellis_lsp_host",
            Self::Host => "trellis",
        }
    }
}

/// Verbosity of a [`LogComponent`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogLevel {
    /// Nothing from the component.
    Off,
    /// Failures only.
    Error,
    /// Failures and recoverable problems.
    Warn,
    /// Lifecycle transitions.
    Info,
    /// Protocol traffic.
    Debug,
    /// Everything.
    Trace,
}
