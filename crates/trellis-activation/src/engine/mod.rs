//! Dependency-ordered, at-most-once extension activation.
//!
//! The engine owns every registered [`ExtensionSpec`] together with its
//! [`ExtensionState`]. Activation walks dependencies depth first, keeping the
//! names currently being activated on an explicit stack; meeting a name that
//! is already on the stack is a dependency cycle and fails immediately
//! instead of recursing forever.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

use crate::error::ActivationError;
use crate::index::TriggerIndex;
use crate::report::{ActivationStats, TriggerReport};
use crate::runtime::{ActivationContext, ExtensionProvisioner, ExtensionRuntime};
use crate::spec::{ExtensionSpec, FILETYPE_EVENT, Trigger};
use crate::state::ExtensionState;

const ENGINE_TARGET: &str = "trellis_activation::engine";

#[derive(Debug)]
struct Entry {
    spec: ExtensionSpec,
    state: ExtensionState,
    install_path: Option<Utf8PathBuf>,
}

/// Registers extensions and activates them on demand.
#[derive(Debug)]
pub struct ActivationEngine<P, R> {
    provisioner: P,
    runtime: R,
    entries: Vec<Entry>,
    positions: HashMap<String, usize>,
    index: TriggerIndex,
    stack: Vec<String>,
    load_order: Vec<String>,
}

impl<P, R> ActivationEngine<P, R>
where
    P: ExtensionProvisioner,
    R: ExtensionRuntime,
{
    /// Creates an engine with no registered extensions.
    pub fn new(provisioner: P, runtime: R) -> Self {
        Self {
            provisioner,
            runtime,
            entries: Vec::new(),
            positions: HashMap::new(),
            index: TriggerIndex::new(),
            stack: Vec::new(),
            load_order: Vec::new(),
        }
    }

    /// Registers `spec` and arms its triggers.
    ///
    /// Enabled specs that are not lazy are activated straight away. A failed
    /// eager activation is logged and recorded in the extension's state; the
    /// registration itself still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Duplicate`] for a name that is already
    /// registered, [`ActivationError::InvalidSpec`] for an empty name or
    /// version and [`ActivationError::InvalidTrigger`] for a malformed event
    /// pattern.
    pub fn register(&mut self, spec: ExtensionSpec) -> Result<(), ActivationError> {
        let name = spec.name().to_owned();
        let eager = self.insert(spec)?;
        if eager && let Err(error) = self.activate(&name) {
            warn!(
                target: ENGINE_TARGET,
                extension = %name,
                error = %error,
                "eager activation failed"
            );
        }
        Ok(())
    }

    /// Registers a batch of specs, then runs [`load_all`](Self::load_all).
    ///
    /// Eager specs are not activated one by one as they arrive, so priority
    /// ordering applies across the whole batch and dependencies may be
    /// declared in any order.
    ///
    /// # Errors
    ///
    /// Stops at the first spec [`register`](Self::register) would reject;
    /// specs before it stay registered and nothing is activated.
    pub fn register_all(
        &mut self,
        specs: impl IntoIterator<Item = ExtensionSpec>,
    ) -> Result<TriggerReport, ActivationError> {
        for spec in specs {
            self.insert(spec)?;
        }
        Ok(self.load_all())
    }

    fn insert(&mut self, spec: ExtensionSpec) -> Result<bool, ActivationError> {
        let name = spec.name().to_owned();
        validate(&spec)?;
        if self.positions.contains_key(&name) {
            return Err(ActivationError::Duplicate { name });
        }
        self.index
            .insert_all(&name, spec.triggers())
            .map_err(|(pattern, error)| ActivationError::InvalidTrigger {
                name: name.clone(),
                pattern,
                message: error.to_string(),
            })?;

        let eager = spec.is_enabled() && !spec.is_lazy();
        let state = if spec.is_enabled() {
            ExtensionState::Registered
        } else {
            ExtensionState::Disabled
        };
        debug!(
            target: ENGINE_TARGET,
            extension = %name,
            lazy = spec.is_lazy(),
            triggers = spec.triggers().len(),
            state = state.label(),
            "extension registered"
        );
        self.positions.insert(name.clone(), self.entries.len());
        self.entries.push(Entry {
            spec,
            state,
            install_path: None,
        });
        Ok(eager)
    }

    /// Dispatches an editor event with its subject (usually a path).
    pub fn on_event(&mut self, event: &str, subject: &str) -> TriggerReport {
        let names = self.index.match_event(event, subject);
        self.dispatch(names)
    }

    /// Dispatches a filetype becoming active.
    pub fn on_filetype(&mut self, filetype: &str) -> TriggerReport {
        self.on_event(FILETYPE_EVENT, filetype)
    }

    /// Dispatches a user command.
    pub fn on_command(&mut self, name: &str) -> TriggerReport {
        let names = self.index.match_command(name);
        self.dispatch(names)
    }

    /// Dispatches a key sequence pressed in `mode`.
    pub fn on_key(&mut self, mode: &str, keys: &str) -> TriggerReport {
        let names = self.index.match_key(mode, keys);
        self.dispatch(names)
    }

    /// Activates `name` after its dependencies.
    ///
    /// Loaded extensions are left alone. A failure marks the extension
    /// failed; the next call retries.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Unknown`] or [`ActivationError::Disabled`]
    /// for names that cannot be activated,
    /// [`ActivationError::DependencyCycle`] when `name` is reached again
    /// through its own dependencies, and the provisioning, runtime or
    /// dependency failure otherwise.
    pub fn activate(&mut self, name: &str) -> Result<(), ActivationError> {
        let position = self.position(name)?;
        match self.state(name) {
            ExtensionState::Loaded { .. } => return Ok(()),
            ExtensionState::Disabled => {
                return Err(ActivationError::Disabled {
                    name: name.to_owned(),
                });
            }
            ExtensionState::Activating => return Err(self.cycle_error(name)),
            ExtensionState::Unregistered
            | ExtensionState::Registered
            | ExtensionState::Failed { .. } => {}
        }

        self.set_state(position, ExtensionState::Activating);
        self.stack.push(name.to_owned());
        let outcome = self.load(name);
        self.stack.pop();

        match outcome {
            Ok((install_path, load_time)) => {
                self.finish_load(position, install_path, load_time);
                Ok(())
            }
            Err(error) => {
                warn!(
                    target: ENGINE_TARGET,
                    extension = name,
                    error = %error,
                    "extension failed to load"
                );
                self.set_state(
                    position,
                    ExtensionState::Failed {
                        message: error.to_string(),
                    },
                );
                Err(error)
            }
        }
    }

    /// Activates every enabled, non-lazy extension that is still pending,
    /// highest priority first and in registration order among equals.
    pub fn load_all(&mut self) -> TriggerReport {
        let mut pending: Vec<(i32, usize, &str)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                entry.spec.is_enabled() && !entry.spec.is_lazy() && entry.state.is_pending()
            })
            .map(|(position, entry)| (entry.spec.priority(), position, entry.spec.name()))
            .collect();
        pending.sort_by_key(|&(priority, position, _)| (std::cmp::Reverse(priority), position));

        let names = pending
            .into_iter()
            .map(|(_, _, name)| name.to_owned())
            .collect();
        let report = self.dispatch(names);
        info!(
            target: ENGINE_TARGET,
            activated = report.activated.len(),
            failed = report.failed.len(),
            "startup load complete"
        );
        report
    }

    /// Current state of `name`; unknown names are
    /// [`ExtensionState::Unregistered`].
    #[must_use]
    pub fn state(&self, name: &str) -> ExtensionState {
        self.positions
            .get(name)
            .and_then(|&position| self.entries.get(position))
            .map_or(ExtensionState::Unregistered, |entry| entry.state.clone())
    }

    /// Spec registered under `name`.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&ExtensionSpec> {
        self.positions
            .get(name)
            .and_then(|&position| self.entries.get(position))
            .map(|entry| &entry.spec)
    }

    /// Returns `true` when `name` has loaded.
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.state(name).is_loaded()
    }

    /// Loaded extension names in the order they finished loading.
    #[must_use]
    pub fn loaded(&self) -> &[String] {
        &self.load_order
    }

    /// Triggers still armed for `name`.
    #[must_use]
    pub fn triggers_for(&self, name: &str) -> Vec<Trigger> {
        self.index.armed(name)
    }

    /// Directory `name` was loaded from.
    #[must_use]
    pub fn install_path(&self, name: &str) -> Option<&camino::Utf8Path> {
        self.positions
            .get(name)
            .and_then(|&position| self.entries.get(position))
            .and_then(|entry| entry.install_path.as_deref())
    }

    /// Counts and load times across all registered extensions.
    #[must_use]
    pub fn stats(&self) -> ActivationStats {
        let mut stats = ActivationStats {
            registered: self.entries.len(),
            ..ActivationStats::default()
        };
        for entry in &self.entries {
            match entry.state {
                ExtensionState::Loaded { .. } => stats.loaded += 1,
                ExtensionState::Failed { .. } => stats.failed += 1,
                ExtensionState::Disabled => stats.disabled += 1,
                ExtensionState::Unregistered
                | ExtensionState::Registered
                | ExtensionState::Activating => {}
            }
        }
        for name in &self.load_order {
            if let ExtensionState::Loaded { load_time } = self.state(name) {
                stats.total_load_time += load_time;
                stats.load_times.push((name.clone(), load_time));
            }
        }
        stats
    }

    /// Runtime extensions are handed to.
    pub const fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Mutable access to the runtime.
    pub const fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    /// Provisioner used to install extensions.
    pub const fn provisioner(&self) -> &P {
        &self.provisioner
    }

    fn dispatch(&mut self, names: Vec<String>) -> TriggerReport {
        let mut report = TriggerReport::default();
        for name in names {
            let Some(entry) = self
                .positions
                .get(&name)
                .and_then(|&position| self.entries.get(position))
            else {
                continue;
            };
            match entry.state {
                ExtensionState::Loaded { .. } | ExtensionState::Activating => continue,
                ExtensionState::Disabled => {
                    report.skipped.push(name);
                    continue;
                }
                ExtensionState::Unregistered
                | ExtensionState::Registered
                | ExtensionState::Failed { .. } => {}
            }
            if !entry.spec.should_activate() {
                debug!(
                    target: ENGINE_TARGET,
                    extension = %name,
                    "predicate declined activation"
                );
                report.skipped.push(name);
                continue;
            }
            match self.activate(&name) {
                Ok(()) => report.activated.push(name),
                Err(error) => report.failed.push((name, error)),
            }
        }
        report
    }

    fn load(&mut self, name: &str) -> Result<(Utf8PathBuf, Duration), ActivationError> {
        let spec = self
            .spec(name)
            .cloned()
            .ok_or_else(|| ActivationError::Unknown {
                name: name.to_owned(),
            })?;

        let mut dependency_paths = BTreeMap::new();
        for dependency in spec.dependencies() {
            if let Err(error) = self.activate(dependency) {
                return Err(match error {
                    cycle @ ActivationError::DependencyCycle { .. } => cycle,
                    other => ActivationError::Dependency {
                        name: name.to_owned(),
                        dependency: dependency.clone(),
                        source: Arc::new(other),
                    },
                });
            }
            if let Some(path) = self.install_path(dependency) {
                dependency_paths.insert(dependency.clone(), path.to_owned());
            }
        }

        let started = Instant::now();
        let install_path = match spec.local_source() {
            Some(path) => path.to_owned(),
            None => self
                .provisioner
                .provision(&spec)
                .map_err(|source| ActivationError::Provision {
                    name: name.to_owned(),
                    source,
                })?,
        };
        let context = ActivationContext::new(spec.clone(), install_path.clone(), dependency_paths);
        self.runtime
            .setup(&context)
            .map_err(|error| ActivationError::Runtime {
                name: name.to_owned(),
                message: error.message().to_owned(),
            })?;
        Ok((install_path, started.elapsed()))
    }

    fn finish_load(&mut self, position: usize, install_path: Utf8PathBuf, load_time: Duration) {
        let Some(entry) = self.entries.get_mut(position) else {
            return;
        };
        entry.state = ExtensionState::Loaded { load_time };
        entry.install_path = Some(install_path);
        let name = entry.spec.name().to_owned();
        if !entry.spec.has_persistent_triggers() {
            self.index.remove_extension(&name);
        }
        info!(
            target: ENGINE_TARGET,
            extension = %name,
            load_time_us = u64::try_from(load_time.as_micros()).unwrap_or(u64::MAX),
            "extension loaded"
        );
        self.load_order.push(name);
    }

    fn cycle_error(&self, name: &str) -> ActivationError {
        let start = self
            .stack
            .iter()
            .position(|entry| entry == name)
            .unwrap_or(0);
        let mut chain: Vec<String> = self.stack.iter().skip(start).cloned().collect();
        chain.push(name.to_owned());
        ActivationError::DependencyCycle { chain }
    }

    fn position(&self, name: &str) -> Result<usize, ActivationError> {
        self.positions
            .get(name)
            .copied()
            .ok_or_else(|| ActivationError::Unknown {
                name: name.to_owned(),
            })
    }

    fn set_state(&mut self, position: usize, state: ExtensionState) {
        if let Some(entry) = self.entries.get_mut(position) {
            entry.state = state;
        }
    }
}

fn validate(spec: &ExtensionSpec) -> Result<(), ActivationError> {
    let invalid = |reason: &str| ActivationError::InvalidSpec {
        name: spec.name().to_owned(),
        reason: reason.to_owned(),
    };
    if spec.name().trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if spec.local_source().is_none() && spec.version().trim().is_empty() {
        return Err(invalid("version is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
