//! Lifecycle state of a registered extension.

use std::time::Duration;

/// Where an extension is in its lifecycle.
///
/// `Registered → Activating → Loaded | Failed`; `Failed` may be retried.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtensionState {
    /// The name is not known to the engine.
    #[default]
    Unregistered,
    /// Registered and waiting for activation.
    Registered,
    /// Activation is in progress.
    Activating,
    /// Setup completed.
    Loaded {
        /// Time spent provisioning and setting up, excluding dependencies.
        load_time: Duration,
    },
    /// The last activation attempt failed.
    Failed {
        /// Rendered error of that attempt.
        message: String,
    },
    /// Registered with `enabled = false`; never activated.
    Disabled,
}

impl ExtensionState {
    /// Returns `true` once setup has completed.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }

    /// Returns `true` when an activation attempt may start from this state.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Registered | Self::Failed { .. })
    }

    /// Short lowercase label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Registered => "registered",
            Self::Activating => "activating",
            Self::Loaded { .. } => "loaded",
            Self::Failed { .. } => "failed",
            Self::Disabled => "disabled",
        }
    }
}
