//! Lazy, dependency-ordered activation of Trellis extensions.
//!
//! Hosts register [`ExtensionSpec`]s with an [`ActivationEngine`] and forward
//! editor events, commands, key presses and filetypes to it. The engine
//! looks up which extensions those triggers arm, activates their
//! dependencies first, provisions each extension through an
//! [`ExtensionProvisioner`] and hands it to an [`ExtensionRuntime`] with an
//! explicit [`ActivationContext`]. Each extension loads at most once.

mod engine;
mod error;
mod index;
mod report;
mod runtime;
mod spec;
mod state;

#[cfg(test)]
mod tests;

pub use engine::ActivationEngine;
pub use error::ActivationError;
pub use index::TriggerIndex;
pub use report::{ActivationStats, TriggerReport};
pub use runtime::{ActivationContext, ExtensionProvisioner, ExtensionRuntime, SetupError};
pub use spec::{ExtensionSpec, ExtensionSpecBuilder, FILETYPE_EVENT, Predicate, Trigger};
pub use state::ExtensionState;
