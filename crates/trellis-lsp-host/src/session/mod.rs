//! One running language server and the thread that reads from it.
//!
//! Every session owns one reader thread and one reply thread. The reader
//! decodes each frame the server sends and routes it: responses complete
//! the request waiting on their id, and `textDocument/publishDiagnostics`
//! replaces the cached diagnostics of an open document. Server-initiated
//! requests are queued for the reply thread, which answers them with a
//! `null` result, so the reader never waits on the writer. Callers block
//! on a condition variable until their response arrives, their deadline
//! passes, or the server's output closes.


use std::collections::{HashMap, HashSet};
use std::io::{BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use lsp_types::{
    ClientCapabilities, ClientInfo, CompletionClientCapabilities, Diagnostic,
    GotoCapability, HoverClientCapabilities, InitializeParams, InitializeResult,
    InitializedParams, PublishDiagnosticsClientCapabilities, PublishDiagnosticsParams,
    ServerCapabilities, TextDocumentClientCapabilities, TextDocumentSyncClientCapabilities,
    WorkspaceFolder,
};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::error::OrchestratorError;
use crate::jsonrpc::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use crate::launcher::{ServerCommand, ServerHandle, ServerLauncher, join_within};
use crate::transport::{FrameReader, FrameWriter};
use crate::uri::{path_to_uri, uri_to_path};

/// Log target for session operations.
const SESSION_TARGET: &str = "trellis_lsp_host::session";

/// Budget for the `shutdown` request during teardown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Time a server gets to exit after `exit` before it is killed.
const EXIT_GRACE: Duration = Duration::from_millis(200);

/// Time teardown waits for the reader and reply threads to stop.
const THREAD_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";

type SharedWriter = Arc<Mutex<Option<FrameWriter<Box<dyn Write + Send>>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Default)]
struct Tables {
    awaiting: HashSet<i64>,
    replies: HashMap<i64, Result<Value, JsonRpcError>>,
    open: HashSet<Utf8PathBuf>,
    diagnostics: HashMap<Utf8PathBuf, Vec<Diagnostic>>,
    closed: Option<String>,
}

enum Wait {
    Reply(Result<Value, JsonRpcError>),
    Closed(String),
    TimedOut,
}

/// State shared between callers and the reader thread.
#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    changed: Condvar,
}

impl Shared {
    fn register(&self, id: i64) {
        lock(&self.tables).awaiting.insert(id);
    }

    fn abandon(&self, id: i64) {
        let mut tables = lock(&self.tables);
        tables.awaiting.remove(&id);
        tables.replies.remove(&id);
    }

    fn complete(&self, language: &str, id: Option<i64>, response: JsonRpcResponse) {
        let mut tables = lock(&self.tables);
        match id {
            Some(request_id) if tables.awaiting.remove(&request_id) => {
                tables.replies.insert(request_id, response.into_result());
                drop(tables);
                self.changed.notify_all();
            }
            _ => debug!(
                target: SESSION_TARGET,
                language,
                id = ?response.id,
                "discarding response nobody is waiting for"
            ),
        }
    }

    fn publish(&self, language: &str, params: Option<Value>) {
        let Some(payload) = params else {
            warn!(target: SESSION_TARGET, language, "diagnostics notification without params");
            return;
        };
        let published: PublishDiagnosticsParams = match serde_json::from_value(payload) {
            Ok(published) => published,
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    language,
                    %error,
                    "discarding malformed diagnostics notification"
                );
                return;
            }
        };
        let Some(path) = uri_to_path(published.uri.as_str()) else {
            debug!(
                target: SESSION_TARGET,
                language,
                uri = published.uri.as_str(),
                "ignoring diagnostics for a non-file URI"
            );
            return;
        };

        let mut tables = lock(&self.tables);
        if !tables.open.contains(&path) {
            debug!(
                target: SESSION_TARGET,
                language,
                %path,
                "discarding diagnostics for a document that is not open"
            );
            return;
        }
        trace!(
            target: SESSION_TARGET,
            language,
            %path,
            count = published.diagnostics.len(),
            "diagnostics published"
        );
        tables.diagnostics.insert(path, published.diagnostics);
        drop(tables);
        self.changed.notify_all();
    }

    fn close(&self, reason: impl Into<String>) {
        let mut tables = lock(&self.tables);
        if tables.closed.is_none() {
            tables.closed = Some(reason.into());
        }
        drop(tables);
        self.changed.notify_all();
    }

    fn closed_reason(&self) -> Option<String> {
        lock(&self.tables).closed.clone()
    }

    fn wait(&self, id: i64, timeout: Duration) -> Wait {
        let deadline = Instant::now() + timeout;
        let mut tables = lock(&self.tables);
        loop {
            if let Some(reply) = tables.replies.remove(&id) {
                return Wait::Reply(reply);
            }
            if let Some(reason) = tables.closed.clone() {
                tables.awaiting.remove(&id);
                return Wait::Closed(reason);
            }
            let now = Instant::now();
            if now >= deadline {
                tables.awaiting.remove(&id);
                return Wait::TimedOut;
            }
            tables = self
                .changed
                .wait_timeout(tables, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// A live connection to one language server.
///
/// Request ids are unique within the session. A request that times out is
/// abandoned: a response arriving for it later is discarded and the
/// session stays usable.
pub struct LanguageSession {
    language: String,
    command: ServerCommand,
    next_id: AtomicI64,
    writer: SharedWriter,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    replier: Mutex<Option<JoinHandle<()>>>,
    handle: Mutex<Option<Box<dyn ServerHandle>>>,
    document_sync: Mutex<()>,
    capabilities: ServerCapabilities,
    initialized: AtomicBool,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for LanguageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageSession")
            .field("language", &self.language)
            .field("command", &self.command)
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl LanguageSession {
    /// Launches a server and performs the `initialize` handshake.
    ///
    /// # Errors
    ///
    /// Returns the launcher's error if the server cannot start,
    /// [`OrchestratorError::InitializationTimeout`] if it does not answer
    /// `initialize` within `initialization_timeout`, and
    /// [`OrchestratorError::InitializationFailed`] if it rejects the
    /// handshake. The server is torn down in every failure case.
    pub fn start(
        language: &str,
        command: &ServerCommand,
        launcher: &dyn ServerLauncher,
        workspace_root: &Utf8Path,
        initialization_timeout: Duration,
    ) -> Result<Self, OrchestratorError> {
        let connection = launcher.launch(language, command)?;
        let shared = Arc::new(Shared::default());
        let writer: SharedWriter = Arc::new(Mutex::new(Some(FrameWriter::new(connection.writer))));
        let mut handle = connection.handle;
        let (replies, queued) = mpsc::channel();

        let threads = spawn_replier(language, queued, &writer).and_then(|replier| {
            spawn_reader(language, connection.reader, &shared, replies)
                .map(|reader| (reader, replier))
        });
        let (reader, replier) = match threads {
            Ok(spawned) => spawned,
            Err(error) => {
                handle.terminate(Duration::ZERO);
                return Err(OrchestratorError::SpawnFailed {
                    command: command.program().to_owned(),
                    source: Arc::new(error),
                });
            }
        };

        let mut session = Self {
            language: language.to_owned(),
            command: command.clone(),
            next_id: AtomicI64::new(1),
            writer,
            shared,
            reader: Mutex::new(Some(reader)),
            replier: Mutex::new(Some(replier)),
            handle: Mutex::new(Some(handle)),
            document_sync: Mutex::new(()),
            capabilities: ServerCapabilities::default(),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        };
        // On failure `session` drops here, which tears the server down.
        session.capabilities = session.initialize(workspace_root, initialization_timeout)?;
        Ok(session)
    }

    fn initialize(
        &self,
        workspace_root: &Utf8Path,
        timeout: Duration,
    ) -> Result<ServerCapabilities, OrchestratorError> {
        let failed = |message: String| OrchestratorError::InitializationFailed {
            language: self.language.clone(),
            message,
        };

        let root_uri = path_to_uri(workspace_root).map_err(|error| failed(error.to_string()))?;
        let folder_name = workspace_root.file_name().unwrap_or("workspace").to_owned();
        #[expect(deprecated, reason = "servers predating workspace folders read rootUri")]
        let initialize_params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri.clone()),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: folder_name,
            }]),
            capabilities: client_capabilities(),
            client_info: Some(ClientInfo {
                name: "trellis".to_owned(),
                version: Some(env!("CARGO_PKG_VERSION").to_owned()),
            }),
            ..InitializeParams::default()
        };
        let payload = serde_json::to_value(initialize_params)
            .map_err(|error| OrchestratorError::codec("initialize", &error))?;

        debug!(
            target: SESSION_TARGET,
            language = %self.language,
            root = %workspace_root,
            "initialising language server"
        );
        let result = match self.call("initialize", Some(payload), timeout) {
            Ok(result) => result,
            Err(OrchestratorError::ResponseTimeout { timeout_ms, .. }) => {
                return Err(OrchestratorError::InitializationTimeout {
                    language: self.language.clone(),
                    timeout_ms,
                });
            }
            Err(error) => return Err(failed(error.to_string())),
        };
        let initialized: InitializeResult =
            serde_json::from_value(result).map_err(|error| failed(error.to_string()))?;

        let initialized_payload = serde_json::to_value(InitializedParams {})
            .map_err(|error| OrchestratorError::codec("initialized", &error))?;
        self.send_notification("initialized", Some(initialized_payload))?;
        self.initialized.store(true, Ordering::SeqCst);

        info!(
            target: SESSION_TARGET,
            language = %self.language,
            server = initialized
                .server_info
                .as_ref()
                .map_or("unknown", |info| info.name.as_str()),
            "language server initialised"
        );
        Ok(initialized.capabilities)
    }

    /// Language this session serves.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Command the server was started with.
    #[must_use]
    pub const fn command(&self) -> &ServerCommand {
        &self.command
    }

    /// Capabilities the server announced during initialisation.
    #[must_use]
    pub const fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Returns `true` while the server is connected and not shut down.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.shut_down.load(Ordering::SeqCst) && self.shared.closed_reason().is_none()
    }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        lock(&self.shared.tables).awaiting.len()
    }

    /// Sends a request and blocks until its response or `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ResponseTimeout`] when the deadline
    /// passes, [`OrchestratorError::ServerError`] when the server answers
    /// with an error, and [`OrchestratorError::SessionClosed`] when the
    /// server has gone away.
    pub fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, OrchestratorError> {
        self.ensure_open()?;
        self.call(method, params, timeout)
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::SessionClosed`] when the server has gone
    /// away and [`OrchestratorError::Transport`] when writing fails.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), OrchestratorError> {
        self.ensure_open()?;
        self.send_notification(method, params)
    }

    /// Diagnostics last published for `path`, or an empty list.
    ///
    /// Only documents opened through this session collect diagnostics.
    #[must_use]
    pub fn diagnostics(&self, path: &Utf8Path) -> Vec<Diagnostic> {
        lock(&self.shared.tables)
            .diagnostics
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    /// Accepts diagnostics for `path` from now on.
    pub(crate) fn track_document(&self, path: &Utf8Path) {
        lock(&self.shared.tables).open.insert(path.to_path_buf());
    }

    /// Drops cached diagnostics for `path` and ignores later publishes.
    pub(crate) fn untrack_document(&self, path: &Utf8Path) {
        let mut tables = lock(&self.shared.tables);
        tables.open.remove(path);
        tables.diagnostics.remove(path);
    }

    /// Serialises document notifications so the server sees versions in
    /// the order they were assigned.
    pub(crate) fn sync_documents(&self) -> MutexGuard<'_, ()> {
        lock(&self.document_sync)
    }

    /// Shuts the server down: `shutdown`, `exit`, then termination.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.initialized.load(Ordering::SeqCst) && self.shared.closed_reason().is_none() {
            if let Err(error) = self.call("shutdown", None, SHUTDOWN_TIMEOUT) {
                debug!(
                    target: SESSION_TARGET,
                    language = %self.language,
                    %error,
                    "shutdown request failed"
                );
            }
            if let Err(error) = self.send_notification("exit", None) {
                debug!(
                    target: SESSION_TARGET,
                    language = %self.language,
                    %error,
                    "exit notification failed"
                );
            }
        }

        // Closing the server's input ends servers that ignored `exit`.
        lock(&self.writer).take();
        if let Some(mut handle) = lock(&self.handle).take() {
            handle.terminate(EXIT_GRACE);
        }
        self.shared.close("session shut down");

        // The reply thread stops once the reader drops its queue.
        let workers = [
            ("reader", lock(&self.reader).take()),
            ("reply", lock(&self.replier).take()),
        ];
        for (role, worker) in workers {
            if let Some(running) = worker
                && !join_within(running, THREAD_JOIN_TIMEOUT)
            {
                warn!(
                    target: SESSION_TARGET,
                    language = %self.language,
                    role,
                    "session thread did not stop; detaching it"
                );
            }
        }

        let mut tables = lock(&self.shared.tables);
        tables.awaiting.clear();
        tables.replies.clear();
        tables.open.clear();
        tables.diagnostics.clear();
        drop(tables);

        info!(
            target: SESSION_TARGET,
            language = %self.language,
            "language server session closed"
        );
    }

    fn ensure_open(&self) -> Result<(), OrchestratorError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(self.closed_error("session shut down".to_owned()));
        }
        match self.shared.closed_reason() {
            Some(reason) => Err(self.closed_error(reason)),
            None => Ok(()),
        }
    }

    fn closed_error(&self, reason: String) -> OrchestratorError {
        OrchestratorError::SessionClosed {
            language: self.language.clone(),
            reason,
        }
    }

    fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, OrchestratorError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::with_id(id, method, params);
        let body = serde_json::to_vec(&request)
            .map_err(|error| OrchestratorError::codec(method, &error))?;

        self.shared.register(id);
        if let Err(error) = self.send(&body) {
            self.shared.abandon(id);
            return Err(error);
        }
        trace!(target: SESSION_TARGET, language = %self.language, id, method, "request sent");

        match self.shared.wait(id, timeout) {
            Wait::Reply(Ok(result)) => Ok(result),
            Wait::Reply(Err(error)) => {
                debug!(
                    target: SESSION_TARGET,
                    language = %self.language,
                    id,
                    method,
                    code = error.code,
                    message = %error.message,
                    "language server returned an error"
                );
                Err(OrchestratorError::server(error))
            }
            Wait::Closed(reason) => Err(self.closed_error(reason)),
            Wait::TimedOut => {
                warn!(
                    target: SESSION_TARGET,
                    language = %self.language,
                    id,
                    method,
                    timeout_ms = millis(timeout),
                    "request timed out; abandoning it"
                );
                Err(OrchestratorError::ResponseTimeout {
                    language: self.language.clone(),
                    method: method.to_owned(),
                    timeout_ms: millis(timeout),
                })
            }
        }
    }

    fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), OrchestratorError> {
        let notification = JsonRpcNotification::new(method, params);
        let body = serde_json::to_vec(&notification)
            .map_err(|error| OrchestratorError::codec(method, &error))?;
        self.send(&body)?;
        trace!(target: SESSION_TARGET, language = %self.language, method, "notification sent");
        Ok(())
    }

    fn send(&self, body: &[u8]) -> Result<(), OrchestratorError> {
        let mut writer = lock(&self.writer);
        let Some(frames) = writer.as_mut() else {
            return Err(self.closed_error("session shut down".to_owned()));
        };
        frames.send(body).map_err(|error| {
            if error.is_closed() {
                self.closed_error("server closed its input".to_owned())
            } else {
                OrchestratorError::Transport {
                    language: self.language.clone(),
                    message: error.to_string(),
                }
            }
        })
    }
}

impl Drop for LanguageSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                did_save: Some(false),
                ..TextDocumentSyncClientCapabilities::default()
            }),
            completion: Some(CompletionClientCapabilities::default()),
            hover: Some(HoverClientCapabilities::default()),
            definition: Some(GotoCapability::default()),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                version_support: Some(true),
                ..PublishDiagnosticsClientCapabilities::default()
            }),
            ..TextDocumentClientCapabilities::default()
        }),
        ..ClientCapabilities::default()
    }
}

fn spawn_reader(
    language: &str,
    reader: Box<dyn Read + Send>,
    shared: &Arc<Shared>,
    replies: Sender<Vec<u8>>,
) -> std::io::Result<JoinHandle<()>> {
    let thread_language = language.to_owned();
    let thread_shared = Arc::clone(shared);
    thread::Builder::new()
        .name(format!("lsp-reader-{language}"))
        .spawn(move || read_loop(&thread_language, reader, &thread_shared, &replies))
}

fn spawn_replier(
    language: &str,
    queued: Receiver<Vec<u8>>,
    writer: &SharedWriter,
) -> std::io::Result<JoinHandle<()>> {
    let thread_language = language.to_owned();
    let thread_writer = Arc::clone(writer);
    thread::Builder::new()
        .name(format!("lsp-replies-{language}"))
        .spawn(move || reply_loop(&thread_language, &queued, &thread_writer))
}

fn read_loop(
    language: &str,
    reader: Box<dyn Read + Send>,
    shared: &Shared,
    replies: &Sender<Vec<u8>>,
) {
    let mut frames = FrameReader::new(BufReader::new(reader));
    let reason = loop {
        match frames.receive() {
            Ok(body) => route(language, &body, shared, replies),
            Err(error) if error.is_closed() => break "server closed its output".to_owned(),
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    language,
                    %error,
                    "unreadable frame from language server"
                );
                break error.to_string();
            }
        }
    };
    debug!(target: SESSION_TARGET, language, %reason, "reader thread stopping");
    shared.close(reason);
}

fn route(language: &str, body: &[u8], shared: &Shared, replies: &Sender<Vec<u8>>) {
    match IncomingMessage::parse(body) {
        Ok(IncomingMessage::Response { id, response }) => shared.complete(language, id, response),
        Ok(IncomingMessage::Notification { method, params }) if method == PUBLISH_DIAGNOSTICS => {
            shared.publish(language, params);
        }
        Ok(IncomingMessage::Notification { method, .. }) => {
            trace!(target: SESSION_TARGET, language, %method, "ignoring notification");
        }
        Ok(IncomingMessage::Request { id, method, .. }) => {
            debug!(
                target: SESSION_TARGET,
                language,
                %method,
                "answering server request with null"
            );
            queue_null_reply(language, id, replies);
        }
        Err(error) => warn!(
            target: SESSION_TARGET,
            language,
            %error,
            "discarding undecodable message"
        ),
    }
}

fn queue_null_reply(language: &str, id: Value, replies: &Sender<Vec<u8>>) {
    let reply = JsonRpcResponse::success(id, Value::Null);
    match serde_json::to_vec(&reply) {
        Ok(body) => {
            if replies.send(body).is_err() {
                debug!(target: SESSION_TARGET, language, "reply thread gone; dropping reply");
            }
        }
        Err(error) => warn!(target: SESSION_TARGET, language, %error, "failed to encode reply"),
    }
}

fn reply_loop(language: &str, queued: &Receiver<Vec<u8>>, writer: &SharedWriter) {
    for body in queued {
        let mut frames = lock(writer);
        let Some(out) = frames.as_mut() else {
            break;
        };
        if let Err(error) = out.send(&body) {
            debug!(
                target: SESSION_TARGET,
                language,
                %error,
                "failed to answer server request"
            );
        }
    }
    trace!(target: SESSION_TARGET, language, "reply thread stopping");
}
