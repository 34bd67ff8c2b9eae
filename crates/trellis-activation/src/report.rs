//! Outcome summaries returned by dispatch and bulk loading.

use std::time::Duration;

use crate::error::ActivationError;

/// What one trigger dispatch or [`load_all`](crate::ActivationEngine::load_all)
/// did to each matching extension.
#[derive(Debug, Default)]
pub struct TriggerReport {
    /// Extensions loaded by this call, in activation order.
    pub activated: Vec<String>,
    /// Extensions left alone because their predicate declined or they are
    /// disabled.
    pub skipped: Vec<String>,
    /// Extensions whose activation failed.
    pub failed: Vec<(String, ActivationError)>,
}

impl TriggerReport {
    /// Returns `true` when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.skipped.is_empty() && self.failed.is_empty()
    }

    /// Returns `true` when every matched extension loaded or was skipped.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Engine-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationStats {
    /// Registered extensions, including disabled ones.
    pub registered: usize,
    /// Extensions in the loaded state.
    pub loaded: usize,
    /// Extensions whose last attempt failed.
    pub failed: usize,
    /// Extensions registered as disabled.
    pub disabled: usize,
    /// Sum of all per-extension load times.
    pub total_load_time: Duration,
    /// Load time per extension, in load order.
    pub load_times: Vec<(String, Duration)>,
}
