//! One language server session per language, shared by every caller.


use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use lsp_types::{
    CompletionResponse, Diagnostic, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, GotoDefinitionResponse, Hover, TextDocumentContentChangeEvent,
    TextDocumentIdentifier, TextDocumentItem, VersionedTextDocumentIdentifier,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};
use trellis_config::Config;

use crate::document::DocumentHandle;
use crate::error::OrchestratorError;
use crate::launcher::{ProcessLauncher, ServerCommand, ServerLauncher};
use crate::session::LanguageSession;
use crate::uri::{path_to_uri, resolve_document};

/// Log target for orchestrator operations.
const ORCHESTRATOR_TARGET: &str = "trellis_lsp_host::orchestrator";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes document traffic and queries to per-language server sessions.
///
/// Every method takes `&self`; share the orchestrator between threads
/// through an [`Arc`]. Sessions start explicitly through
/// [`ensure_language`](Self::ensure_language) and stay up until
/// [`shutdown`](Self::shutdown) or drop.
pub struct LanguageOrchestrator {
    launcher: Box<dyn ServerLauncher>,
    workspace_root: Utf8PathBuf,
    initialization_timeout: Duration,
    response_timeout: Duration,
    starting: Mutex<()>,
    sessions: Mutex<HashMap<String, Arc<LanguageSession>>>,
    documents: Mutex<HashMap<Utf8PathBuf, DocumentHandle>>,
}

impl std::fmt::Debug for LanguageOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageOrchestrator")
            .field("workspace_root", &self.workspace_root)
            .field("languages", &self.languages())
            .field("open_documents", &lock(&self.documents).len())
            .finish_non_exhaustive()
    }
}

impl LanguageOrchestrator {
    /// Creates an orchestrator that starts servers through `launcher`.
    ///
    /// The workspace root and timeout budgets come from `config`.
    #[must_use]
    pub fn new(config: &Config, launcher: impl ServerLauncher + 'static) -> Self {
        Self {
            launcher: Box::new(launcher),
            workspace_root: config.workspace_root().to_path_buf(),
            initialization_timeout: config.initialization_timeout(),
            response_timeout: config.response_timeout(),
            starting: Mutex::new(()),
            sessions: Mutex::new(HashMap::new()),
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an orchestrator that spawns servers as child processes.
    #[must_use]
    pub fn with_process_launcher(config: &Config) -> Self {
        Self::new(config, ProcessLauncher::new())
    }

    /// Workspace root reported to servers and used for relative paths.
    #[must_use]
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Starts the session for `language` unless one is already running.
    ///
    /// A session whose server has died is replaced, and documents opened
    /// through it are forgotten.
    ///
    /// # Errors
    ///
    /// Returns the launch or initialisation failure. No session is
    /// registered in that case, so a later call retries.
    pub fn ensure_language(
        &self,
        language: &str,
        command: &ServerCommand,
    ) -> Result<(), OrchestratorError> {
        let _starting = lock(&self.starting);
        if let Some(existing) = self.session(language) {
            if existing.is_alive() {
                return Ok(());
            }
            info!(
                target: ORCHESTRATOR_TARGET,
                language,
                "replacing language server session that is no longer running"
            );
            self.retire(language);
        }

        let session = LanguageSession::start(
            language,
            command,
            self.launcher.as_ref(),
            &self.workspace_root,
            self.initialization_timeout,
        )?;
        lock(&self.sessions).insert(language.to_owned(), Arc::new(session));
        info!(
            target: ORCHESTRATOR_TARGET,
            language,
            program = command.program(),
            "language server session started"
        );
        Ok(())
    }

    /// The session for `language`, if one is registered.
    #[must_use]
    pub fn session(&self, language: &str) -> Option<Arc<LanguageSession>> {
        lock(&self.sessions).get(language).cloned()
    }

    /// Languages with a registered session, sorted.
    #[must_use]
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        languages.sort();
        languages
    }

    /// Opens a document with the server for `language`.
    ///
    /// `location` is a path (relative paths resolve against the workspace
    /// root) or a `file://` URI. Opening a document that is already open
    /// sends its new content as a change instead.
    ///
    /// The document table is never locked while writing to a server, so a
    /// stalled server only holds up traffic for its own language.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownLanguage`] when no session runs
    /// for `language`, [`OrchestratorError::InvalidDocument`] for an
    /// unresolvable location, and session errors when sending fails.
    pub fn did_open(
        &self,
        location: &str,
        language: &str,
        text: &str,
    ) -> Result<DocumentHandle, OrchestratorError> {
        let path = resolve_document(location, &self.workspace_root)?;
        let owner = self.owner(&path);
        let session = self.running(owner.as_deref().unwrap_or(language))?;
        let uri = path_to_uri(&path)?;
        let _sync = session.sync_documents();

        let mut documents = lock(&self.documents);
        if let Some(document) = documents.get_mut(&path) {
            let next = reserve_version(document);
            drop(documents);
            return send_change(&session, next, text);
        }
        let document = DocumentHandle::open(path.clone(), uri.clone(), language);
        documents.insert(path.clone(), document.clone());
        drop(documents);

        session.track_document(&path);
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem::new(uri, language.to_owned(), 1, text.to_owned()),
        };
        let sent = encode("textDocument/didOpen", &params)
            .and_then(|payload| session.notify("textDocument/didOpen", Some(payload)));
        if let Err(error) = sent {
            lock(&self.documents).remove(&path);
            session.untrack_document(&path);
            return Err(error);
        }
        debug!(target: ORCHESTRATOR_TARGET, language, %path, "document opened");
        Ok(document)
    }

    /// Replaces the full content of an open document.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownDocument`] when the document is
    /// not open and session errors when sending fails.
    pub fn did_change(
        &self,
        location: &str,
        text: &str,
    ) -> Result<DocumentHandle, OrchestratorError> {
        let path = resolve_document(location, &self.workspace_root)?;
        let language = self
            .owner(&path)
            .ok_or_else(|| OrchestratorError::UnknownDocument { path: path.clone() })?;
        let session = self.running(&language)?;
        let _sync = session.sync_documents();

        let next = lock(&self.documents)
            .get_mut(&path)
            .map(reserve_version)
            .ok_or(OrchestratorError::UnknownDocument { path })?;
        send_change(&session, next, text)
    }

    /// Closes an open document and drops its cached diagnostics.
    ///
    /// Diagnostics the server publishes for the document after this call
    /// are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownDocument`] when the document is
    /// not open and session errors when sending fails. The document is
    /// forgotten either way.
    pub fn did_close(&self, location: &str) -> Result<(), OrchestratorError> {
        let path = resolve_document(location, &self.workspace_root)?;
        let language = self
            .owner(&path)
            .ok_or_else(|| OrchestratorError::UnknownDocument { path: path.clone() })?;
        let Some(session) = self.session(&language) else {
            lock(&self.documents).remove(&path);
            return Err(OrchestratorError::UnknownLanguage { language });
        };
        let _sync = session.sync_documents();

        let document = lock(&self.documents)
            .remove(&path)
            .ok_or_else(|| OrchestratorError::UnknownDocument { path: path.clone() })?;
        session.untrack_document(&path);
        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier::new(document.uri().clone()),
        };
        session.notify(
            "textDocument/didClose",
            Some(encode("textDocument/didClose", &params)?),
        )?;
        debug!(target: ORCHESTRATOR_TARGET, %path, "document closed");
        Ok(())
    }

    /// The open document at `location`, if any.
    #[must_use]
    pub fn document(&self, location: &str) -> Option<DocumentHandle> {
        let path = resolve_document(location, &self.workspace_root).ok()?;
        lock(&self.documents).get(&path).cloned()
    }

    /// All open documents, ordered by path.
    #[must_use]
    pub fn open_documents(&self) -> Vec<DocumentHandle> {
        let mut documents: Vec<DocumentHandle> = lock(&self.documents).values().cloned().collect();
        documents.sort_by(|left, right| left.path().cmp(right.path()));
        documents
    }

    /// Completion items at a position.
    ///
    /// # Errors
    ///
    /// See [`request_with_timeout`](Self::request_with_timeout).
    pub fn request_completion(
        &self,
        location: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<CompletionResponse>, OrchestratorError> {
        self.request_with_timeout(
            location,
            "textDocument/completion",
            line,
            character,
            self.response_timeout,
        )
    }

    /// Hover information at a position.
    ///
    /// # Errors
    ///
    /// See [`request_with_timeout`](Self::request_with_timeout).
    pub fn request_hover(
        &self,
        location: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<Hover>, OrchestratorError> {
        self.request_with_timeout(
            location,
            "textDocument/hover",
            line,
            character,
            self.response_timeout,
        )
    }

    /// Definition locations for the symbol at a position.
    ///
    /// # Errors
    ///
    /// See [`request_with_timeout`](Self::request_with_timeout).
    pub fn request_definition(
        &self,
        location: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<GotoDefinitionResponse>, OrchestratorError> {
        self.request_with_timeout(
            location,
            "textDocument/definition",
            line,
            character,
            self.response_timeout,
        )
    }

    /// Sends a position request for an open document with an explicit
    /// timeout. A `null` result decodes as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownDocument`] when the document is
    /// not open, [`OrchestratorError::ResponseTimeout`] when the server does
    /// not answer within `timeout`, [`OrchestratorError::ServerError`] when
    /// it answers with an error and [`OrchestratorError::Codec`] when the
    /// result does not decode as `R`.
    pub fn request_with_timeout<R: DeserializeOwned>(
        &self,
        location: &str,
        method: &str,
        line: u32,
        character: u32,
        timeout: Duration,
    ) -> Result<Option<R>, OrchestratorError> {
        let path = resolve_document(location, &self.workspace_root)?;
        let document = lock(&self.documents)
            .get(&path)
            .cloned()
            .ok_or(OrchestratorError::UnknownDocument { path })?;
        let session = self.running(document.language())?;

        let params = json!({
            "textDocument": {"uri": document.uri().as_str()},
            "position": {"line": line, "character": character},
        });
        let result = session.request(method, Some(params), timeout)?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|error| OrchestratorError::codec(method, &error))
    }

    /// Diagnostics last published for an open document, or an empty list
    /// when none were published or the document is not open.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidDocument`] for an unresolvable
    /// location.
    pub fn request_diagnostics(&self, location: &str) -> Result<Vec<Diagnostic>, OrchestratorError> {
        let path = resolve_document(location, &self.workspace_root)?;
        let Some(language) = self.owner(&path) else {
            return Ok(Vec::new());
        };
        Ok(self
            .session(&language)
            .map(|session| session.diagnostics(&path))
            .unwrap_or_default())
    }

    /// Stops the session for `language` and forgets its documents.
    ///
    /// Returns `false` when no session was registered.
    pub fn shutdown_language(&self, language: &str) -> bool {
        let _starting = lock(&self.starting);
        self.retire(language)
    }

    /// Stops every session and forgets every document.
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<LanguageSession>> =
            lock(&self.sessions).drain().map(|(_, session)| session).collect();
        lock(&self.documents).clear();
        for session in sessions {
            session.shutdown();
        }
    }

    fn retire(&self, language: &str) -> bool {
        let Some(session) = lock(&self.sessions).remove(language) else {
            return false;
        };
        lock(&self.documents).retain(|_, document| document.language() != language);
        session.shutdown();
        true
    }

    fn owner(&self, path: &Utf8Path) -> Option<String> {
        lock(&self.documents)
            .get(path)
            .map(|document| document.language().to_owned())
    }

    fn running(&self, language: &str) -> Result<Arc<LanguageSession>, OrchestratorError> {
        self.session(language)
            .ok_or_else(|| OrchestratorError::UnknownLanguage {
                language: language.to_owned(),
            })
    }
}

impl Drop for LanguageOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Claims the next version of `document` and returns the updated handle.
fn reserve_version(document: &mut DocumentHandle) -> DocumentHandle {
    document.bump();
    document.clone()
}

fn send_change(
    session: &LanguageSession,
    document: DocumentHandle,
    text: &str,
) -> Result<DocumentHandle, OrchestratorError> {
    let version = document.version();
    let params = DidChangeTextDocumentParams {
        text_document: VersionedTextDocumentIdentifier::new(document.uri().clone(), version),
        content_changes: vec![TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: text.to_owned(),
        }],
    };
    session.notify(
        "textDocument/didChange",
        Some(encode("textDocument/didChange", &params)?),
    )?;
    debug!(
        target: ORCHESTRATOR_TARGET,
        path = %document.path(),
        version,
        "document changed"
    );
    Ok(document)
}

fn encode(method: &str, params: &impl Serialize) -> Result<Value, OrchestratorError> {
    serde_json::to_value(params).map_err(|error| OrchestratorError::codec(method, &error))
}
