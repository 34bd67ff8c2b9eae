//! Trellis: extension lifecycle and language intelligence for editors.
//!
//! A [`Trellis`] host owns three collaborators built from one
//! [`Config`](trellis_config::Config):
//!
//! - a registry [`Installer`](trellis_installer::Installer) that fetches
//!   and extracts extension archives,
//! - an [`ActivationEngine`](trellis_activation::ActivationEngine) that
//!   loads extensions lazily when their triggers fire,
//! - a [`LanguageOrchestrator`](trellis_lsp_host::LanguageOrchestrator)
//!   that runs one language server per language.
//!
//! Extensions declared on the [`LanguageServerRuntime`] start their
//! language server when they load, so opening the first document of a
//! filetype installs, activates and connects everything it needs.
//!
//! ```no_run
//! use trellis::{Trellis, telemetry};
//! use trellis::activation::ExtensionSpec;
//! use trellis::config::Config;
//! use trellis::installer::HttpFetcher;
//! use trellis::lsp::{ProcessLauncher, ServerCommand};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! telemetry::initialise(&config)?;
//!
//! let fetcher = HttpFetcher::new(config.http_timeout())?;
//! let mut host = Trellis::new(config, fetcher, ProcessLauncher::new())?;
//! host.engine_mut()
//!     .runtime_mut()
//!     .register_server("zig-tools", "zig", ServerCommand::new("bin/zls"));
//! host.register(ExtensionSpec::builder("zig-tools", "1.2.0").on_filetype("zig").build())?;
//!
//! let opened = host.open_document("src/main.zig", "zig", "const x = 1;")?;
//! if let Some(document) = opened.document {
//!     let hover = host.orchestrator().request_hover(document.path().as_str(), 0, 6)?;
//!     println!("{hover:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod host;
mod runtime;
pub mod telemetry;

pub use host::{HostError, OpenedDocument, Trellis};
pub use runtime::LanguageServerRuntime;

pub use trellis_activation as activation;
pub use trellis_config as config;
pub use trellis_installer as installer;
pub use trellis_lsp_host as lsp;
