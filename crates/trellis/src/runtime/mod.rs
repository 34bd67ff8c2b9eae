//! Extension runtime that brings up language servers for extensions.
//!
//! Scripting is out of reach for the backbone, but the one thing every
//! language extension does on setup is ask the orchestrator for its
//! server. [`LanguageServerRuntime`] does exactly that for the extensions
//! it knows about and accepts every other extension as-is.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use camino::Utf8Path;
use tracing::{debug, info};
use trellis_activation::{ActivationContext, ExtensionRuntime, SetupError};
use trellis_lsp_host::{LanguageOrchestrator, ServerCommand};

const RUNTIME_TARGET: &str = "trellis::runtime";

#[derive(Debug, Clone)]
struct ServerBinding {
    language: String,
    command: ServerCommand,
}

/// Starts the language server an extension provides when it is set up.
#[derive(Debug)]
pub struct LanguageServerRuntime {
    orchestrator: Arc<LanguageOrchestrator>,
    servers: HashMap<String, ServerBinding>,
}

impl LanguageServerRuntime {
    /// Creates a runtime that starts servers through `orchestrator`.
    #[must_use]
    pub fn new(orchestrator: Arc<LanguageOrchestrator>) -> Self {
        Self {
            orchestrator,
            servers: HashMap::new(),
        }
    }

    /// Declares that setting up `extension` starts `command` for `language`.
    ///
    /// A relative program containing a path separator is resolved against
    /// the extension's install directory.
    #[must_use]
    pub fn with_server(mut self, extension: &str, language: &str, command: ServerCommand) -> Self {
        self.register_server(extension, language, command);
        self
    }

    /// In-place form of [`with_server`](Self::with_server).
    pub fn register_server(&mut self, extension: &str, language: &str, command: ServerCommand) {
        self.servers.insert(
            extension.to_owned(),
            ServerBinding {
                language: language.to_owned(),
                command,
            },
        );
    }

    /// Language served by `extension`, if it declared a server.
    #[must_use]
    pub fn language_of(&self, extension: &str) -> Option<&str> {
        self.servers
            .get(extension)
            .map(|binding| binding.language.as_str())
    }

    /// Orchestrator the runtime starts servers with.
    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<LanguageOrchestrator> {
        &self.orchestrator
    }
}

impl ExtensionRuntime for LanguageServerRuntime {
    fn setup(&mut self, context: &ActivationContext) -> Result<(), SetupError> {
        let Some(binding) = self.servers.get(context.name()) else {
            debug!(
                target: RUNTIME_TARGET,
                extension = context.name(),
                "extension provides no language server"
            );
            return Ok(());
        };

        let command = resolve_command(&binding.command, context.install_path());
        self.orchestrator
            .ensure_language(&binding.language, &command)
            .map_err(|error| SetupError::new(error.to_string()))?;
        info!(
            target: RUNTIME_TARGET,
            extension = context.name(),
            language = %binding.language,
            program = command.program(),
            "language server ready for extension"
        );
        Ok(())
    }
}

/// Roots a relative program path such as `bin/zls` in `install_path`.
pub(crate) fn resolve_command(command: &ServerCommand, install_path: &Utf8Path) -> ServerCommand {
    let program = Utf8Path::new(command.program());
    if program.is_absolute() || program.components().count() < 2 {
        return command.clone();
    }
    command
        .clone()
        .with_program(install_path.join(program).into_string())
}
