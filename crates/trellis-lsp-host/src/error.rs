//! Error types for the language server orchestrator.

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::jsonrpc::JsonRpcError;

/// Errors surfaced by the orchestrator and its sessions.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// The server binary could not be found.
    #[error("language server binary '{command}' not found")]
    BinaryNotFound {
        /// The command that was attempted.
        command: String,
        /// Underlying error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Failed to spawn the server process.
    #[error("failed to spawn language server '{command}': {source}")]
    SpawnFailed {
        /// The command that was attempted.
        command: String,
        /// Underlying error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The server did not answer `initialize` in time.
    #[error("{language} language server did not initialise within {timeout_ms}ms")]
    InitializationTimeout {
        /// Language of the session.
        language: String,
        /// Budget that elapsed.
        timeout_ms: u64,
    },

    /// The server rejected or garbled the `initialize` handshake.
    #[error("{language} language server failed to initialise: {message}")]
    InitializationFailed {
        /// Language of the session.
        language: String,
        /// Failure details.
        message: String,
    },

    /// A request received no response in time.
    #[error("{language} language server did not answer '{method}' within {timeout_ms}ms")]
    ResponseTimeout {
        /// Language of the session.
        language: String,
        /// Method that timed out.
        method: String,
        /// Budget that elapsed.
        timeout_ms: u64,
    },

    /// The server answered with a JSON-RPC error.
    #[error("language server error {code}: {message}")]
    ServerError {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
    },

    /// No session is running for the language.
    #[error("no language server is running for '{language}'")]
    UnknownLanguage {
        /// Requested language.
        language: String,
    },

    /// The document has not been opened.
    #[error("document '{path}' is not open")]
    UnknownDocument {
        /// Canonical path of the document.
        path: Utf8PathBuf,
    },

    /// A document path or URI could not be resolved.
    #[error("invalid document location '{location}': {message}")]
    InvalidDocument {
        /// The location as supplied.
        location: String,
        /// Why it was rejected.
        message: String,
    },

    /// The session's connection to its server is gone.
    #[error("{language} language server session is closed: {reason}")]
    SessionClosed {
        /// Language of the session.
        language: String,
        /// What closed it.
        reason: String,
    },

    /// Writing to the server failed.
    #[error("failed to send to {language} language server: {message}")]
    Transport {
        /// Language of the session.
        language: String,
        /// Transport failure details.
        message: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("failed to encode or decode '{method}': {message}")]
    Codec {
        /// Method whose payload failed.
        method: String,
        /// Serde diagnostic.
        message: String,
    },
}

impl OrchestratorError {
    pub(crate) fn server(error: JsonRpcError) -> Self {
        Self::ServerError {
            code: error.code,
            message: error.message,
        }
    }

    pub(crate) fn codec(method: &str, error: &serde_json::Error) -> Self {
        Self::Codec {
            method: method.to_owned(),
            message: error.to_string(),
        }
    }

    pub(crate) fn invalid_document(location: &str, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            location: location.to_owned(),
            message: message.into(),
        }
    }
}
