//! The host: one installer-backed activation engine and one language
//! orchestrator driven from a single configuration.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use trellis_activation::{
    ActivationEngine, ActivationError, ExtensionRuntime, ExtensionSpec, TriggerReport,
};
use trellis_config::{Config, ConfigError};
use trellis_installer::{ArchiveFetcher, InstallError, Installer};
use trellis_lsp_host::{DocumentHandle, LanguageOrchestrator, OrchestratorError, ServerLauncher};

use crate::runtime::LanguageServerRuntime;

const HOST_TARGET: &str = "trellis::host";

/// Errors raised while building or driving a [`Trellis`] host.
#[derive(Debug, Error)]
pub enum HostError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The installer could not be opened.
    #[error(transparent)]
    Install(#[from] InstallError),
    /// An extension could not be registered.
    #[error(transparent)]
    Activation(#[from] ActivationError),
    /// The language orchestrator rejected a document operation.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

/// Result of [`Trellis::open_document`].
#[derive(Debug)]
pub struct OpenedDocument {
    /// Extensions the filetype trigger loaded, skipped or failed.
    pub activation: TriggerReport,
    /// The open document, when a language server runs for the filetype.
    pub document: Option<DocumentHandle>,
}

/// Ties lazy activation, registry installs and language servers together.
#[derive(Debug)]
pub struct Trellis<F, R = LanguageServerRuntime> {
    config: Config,
    engine: ActivationEngine<Installer<F>, R>,
    orchestrator: Arc<LanguageOrchestrator>,
}

impl<F: ArchiveFetcher> Trellis<F> {
    /// Builds a host whose extensions start language servers through
    /// `launcher`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Config`] for an invalid configuration and
    /// [`HostError::Install`] when the lock file cannot be read.
    pub fn new(
        config: Config,
        fetcher: F,
        launcher: impl ServerLauncher + 'static,
    ) -> Result<Self, HostError> {
        Self::with_runtime(config, fetcher, launcher, LanguageServerRuntime::new)
    }
}

impl<F: ArchiveFetcher, R: ExtensionRuntime> Trellis<F, R> {
    /// Builds a host with a custom extension runtime created from the
    /// shared orchestrator.
    ///
    /// # Errors
    ///
    /// Same as [`Trellis::new`].
    pub fn with_runtime(
        config: Config,
        fetcher: F,
        launcher: impl ServerLauncher + 'static,
        runtime: impl FnOnce(Arc<LanguageOrchestrator>) -> R,
    ) -> Result<Self, HostError> {
        config.validate()?;
        let installer = Installer::open(&config, fetcher)?;
        let orchestrator = Arc::new(LanguageOrchestrator::new(&config, launcher));
        let engine = ActivationEngine::new(installer, runtime(Arc::clone(&orchestrator)));
        info!(
            target: HOST_TARGET,
            install_dir = %config.install_dir(),
            workspace_root = %config.workspace_root(),
            "trellis host ready"
        );
        Ok(Self {
            config,
            engine,
            orchestrator,
        })
    }

    /// Registers one extension.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Activation`] when the engine rejects the extension.
    pub fn register(&mut self, spec: ExtensionSpec) -> Result<(), HostError> {
        Ok(self.engine.register(spec)?)
    }

    /// Registers several extensions and loads the eager ones.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Activation`] when any spec is rejected.
    pub fn register_all(
        &mut self,
        specs: impl IntoIterator<Item = ExtensionSpec>,
    ) -> Result<TriggerReport, HostError> {
        Ok(self.engine.register_all(specs)?)
    }

    /// Opens a document in the editor.
    ///
    /// Fires the filetype trigger first so extensions providing the
    /// language server load, then opens the document on that server if one
    /// is running for `filetype`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Orchestrator`] when the server rejects the open.
    /// Activation failures are reported in [`OpenedDocument::activation`].
    pub fn open_document(
        &mut self,
        location: &str,
        filetype: &str,
        text: &str,
    ) -> Result<OpenedDocument, HostError> {
        let activation = self.engine.on_filetype(filetype);
        let document = if self.orchestrator.session(filetype).is_some() {
            Some(self.orchestrator.did_open(location, filetype, text)?)
        } else {
            debug!(target: HOST_TARGET, filetype, location, "no language server for filetype");
            None
        };
        Ok(OpenedDocument {
            activation,
            document,
        })
    }

    /// Forwards an editor event.
    pub fn on_event(&mut self, event: &str, subject: &str) -> TriggerReport {
        self.engine.on_event(event, subject)
    }

    /// Forwards a command invocation.
    pub fn on_command(&mut self, name: &str) -> TriggerReport {
        self.engine.on_command(name)
    }

    /// Forwards a key press.
    pub fn on_key(&mut self, mode: &str, keys: &str) -> TriggerReport {
        self.engine.on_key(mode, keys)
    }

    /// Configuration the host was built from.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Activation engine.
    #[must_use]
    pub const fn engine(&self) -> &ActivationEngine<Installer<F>, R> {
        &self.engine
    }

    /// Mutable activation engine.
    pub const fn engine_mut(&mut self) -> &mut ActivationEngine<Installer<F>, R> {
        &mut self.engine
    }

    /// Shared language orchestrator.
    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<LanguageOrchestrator> {
        &self.orchestrator
    }

    /// Stops every language server.
    pub fn shutdown(&self) {
        info!(target: HOST_TARGET, "shutting down trellis host");
        self.orchestrator.shutdown();
    }
}
