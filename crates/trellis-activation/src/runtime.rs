//! Collaborators the engine hands extensions to.
//!
//! Provisioning puts an extension's files on disk; the runtime executes its
//! setup logic. Both sit behind traits so hosts can plug in a registry
//! installer and a scripting runtime, and tests can plug in mocks.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use trellis_installer::{ArchiveFetcher, InstallError, Installer};

use crate::spec::ExtensionSpec;

/// Makes an extension's files available locally.
pub trait ExtensionProvisioner {
    /// Ensures `spec` is installed and returns its directory.
    ///
    /// # Errors
    ///
    /// Returns the installer failure when the extension cannot be installed.
    fn provision(&mut self, spec: &ExtensionSpec) -> Result<Utf8PathBuf, InstallError>;
}

impl<F: ArchiveFetcher> ExtensionProvisioner for Installer<F> {
    fn provision(&mut self, spec: &ExtensionSpec) -> Result<Utf8PathBuf, InstallError> {
        self.install(spec.name(), spec.version())?;
        self.install_path(spec.name())
    }
}

/// Failure reported by an [`ExtensionRuntime`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SetupError {
    message: String,
}

impl SetupError {
    /// Creates a setup failure with a diagnostic.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Diagnostic text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Everything a runtime needs to start one extension.
#[derive(Debug, Clone)]
pub struct ActivationContext {
    spec: ExtensionSpec,
    install_path: Utf8PathBuf,
    dependency_paths: BTreeMap<String, Utf8PathBuf>,
}

impl ActivationContext {
    pub(crate) const fn new(
        spec: ExtensionSpec,
        install_path: Utf8PathBuf,
        dependency_paths: BTreeMap<String, Utf8PathBuf>,
    ) -> Self {
        Self {
            spec,
            install_path,
            dependency_paths,
        }
    }

    /// Spec of the extension being activated.
    #[must_use]
    pub const fn spec(&self) -> &ExtensionSpec {
        &self.spec
    }

    /// Extension name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Directory holding the extension's files.
    #[must_use]
    pub fn install_path(&self) -> &Utf8Path {
        &self.install_path
    }

    /// Directory of an already loaded direct dependency.
    #[must_use]
    pub fn dependency_path(&self, name: &str) -> Option<&Utf8Path> {
        self.dependency_paths.get(name).map(Utf8PathBuf::as_path)
    }

    /// Directories of all direct dependencies, by name.
    #[must_use]
    pub const fn dependency_paths(&self) -> &BTreeMap<String, Utf8PathBuf> {
        &self.dependency_paths
    }
}

/// Executes an extension's own setup logic.
pub trait ExtensionRuntime {
    /// Starts the extension described by `context`.
    ///
    /// # Errors
    ///
    /// Returns a [`SetupError`] when the extension fails to start.
    fn setup(&mut self, context: &ActivationContext) -> Result<(), SetupError>;
}
