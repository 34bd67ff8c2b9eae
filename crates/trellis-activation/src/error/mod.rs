//! Errors raised while registering and activating extensions.

use std::sync::Arc;

use thiserror::Error;
use trellis_installer::InstallError;

/// Errors arising from the activation engine.
#[derive(Debug, Clone, Error)]
pub enum ActivationError {
    /// An extension with this name is already registered.
    #[error("extension '{name}' is already registered")]
    Duplicate {
        /// Extension name.
        name: String,
    },

    /// No extension with this name is registered.
    #[error("extension '{name}' is not registered")]
    Unknown {
        /// Extension name.
        name: String,
    },

    /// The extension declaration is malformed.
    #[error("invalid spec for extension '{name}': {reason}")]
    InvalidSpec {
        /// Extension name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An event pattern is not a valid glob.
    #[error("invalid trigger pattern '{pattern}' for extension '{name}': {message}")]
    InvalidTrigger {
        /// Extension name.
        name: String,
        /// Offending pattern.
        pattern: String,
        /// Glob compiler diagnostic.
        message: String,
    },

    /// The extension was registered with `enabled = false`.
    #[error("extension '{name}' is disabled")]
    Disabled {
        /// Extension name.
        name: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle: {}", .chain.join(" -> "))]
    DependencyCycle {
        /// Extensions on the cycle, starting and ending with the same name.
        chain: Vec<String>,
    },

    /// A dependency failed to activate.
    #[error("extension '{name}' cannot load because dependency '{dependency}' failed")]
    Dependency {
        /// Extension that was being activated.
        name: String,
        /// Dependency that failed.
        dependency: String,
        /// Why the dependency failed.
        #[source]
        source: Arc<ActivationError>,
    },

    /// The extension could not be installed.
    #[error("failed to provision extension '{name}'")]
    Provision {
        /// Extension name.
        name: String,
        /// Installer failure.
        #[source]
        source: InstallError,
    },

    /// The scripting runtime rejected the extension.
    #[error("runtime setup of extension '{name}' failed: {message}")]
    Runtime {
        /// Extension name.
        name: String,
        /// Runtime diagnostic.
        message: String,
    },
}

impl ActivationError {
    /// Returns the dependency cycle carried by this error, following
    /// dependency failures down to the root cause.
    #[must_use]
    pub fn cycle(&self) -> Option<&[String]> {
        match self {
            Self::DependencyCycle { chain } => Some(chain),
            Self::Dependency { source, .. } => source.cycle(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests;
