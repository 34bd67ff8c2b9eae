//! Language server orchestration for Trellis.
//!
//! The [`LanguageOrchestrator`] keeps one [`LanguageSession`] per language.
//! Each session owns a server process (started by a [`ServerLauncher`]),
//! speaks JSON-RPC over `Content-Length` framed stdio, and runs a reader
//! thread that correlates responses with requests by id and caches the
//! diagnostics the server publishes for open documents.
//!
//! ```no_run
//! use trellis_config::Config;
//! use trellis_lsp_host::{LanguageOrchestrator, ServerCommand};
//!
//! # fn main() -> Result<(), trellis_lsp_host::OrchestratorError> {
//! let orchestrator = LanguageOrchestrator::with_process_launcher(&Config::default());
//! orchestrator.ensure_language("zig", &ServerCommand::new("zls"))?;
//! orchestrator.did_open("src/main.zig", "zig", "const std = @import(\"std\");")?;
//! let hover = orchestrator.request_hover("src/main.zig", 0, 6)?;
//! # let _ = hover;
//! # Ok(())
//! # }
//! ```

mod document;
mod error;
mod jsonrpc;
mod launcher;
mod orchestrator;
mod session;
mod transport;
mod uri;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use document::DocumentHandle;
pub use error::OrchestratorError;
pub use jsonrpc::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    METHOD_NOT_FOUND, MessageError,
};
pub use launcher::{ProcessLauncher, ServerCommand, ServerConnection, ServerHandle, ServerLauncher};
pub use orchestrator::LanguageOrchestrator;
pub use session::LanguageSession;
pub use transport::{FrameReader, FrameWriter, TransportError};
pub use uri::{path_to_uri, resolve_document, uri_to_path};
