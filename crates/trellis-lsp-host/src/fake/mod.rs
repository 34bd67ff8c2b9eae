//! An in-process language server for tests.
//!
//! [`FakeLauncher`] implements [`ServerLauncher`] by running a scripted
//! server on a thread connected through anonymous pipes. The server answers
//! `initialize`, `shutdown`, hover, completion and definition requests, can
//! publish one diagnostic per document version, can stall or flood its
//! output on cue, and records every method it receives. Enabled with the `test-support` feature.

use std::io::{self, BufReader};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::OrchestratorError;
use crate::jsonrpc::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    METHOD_NOT_FOUND,
};
use crate::launcher::{ServerCommand, ServerConnection, ServerHandle, ServerLauncher, join_within};
use crate::transport::{FrameReader, FrameWriter};

const FAKE_TARGET: &str = "trellis_lsp_host::fake";

/// Behaviour of the scripted server.
#[derive(Debug, Clone, Default)]
pub struct FakeScript {
    silent_initializations: usize,
    silent_methods: Vec<String>,
    delays: Vec<(String, Duration)>,
    batch: usize,
    publish_diagnostics: bool,
    publish_after_close: bool,
    configuration_request: bool,
    stalls: Vec<(String, Duration)>,
    chatter: Option<(String, usize)>,
    crash_on: Option<String>,
}

impl FakeScript {
    /// A server that answers everything immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignores `initialize` on the first `launches` launches.
    #[must_use]
    pub const fn ignore_initialize(mut self, launches: usize) -> Self {
        self.silent_initializations = launches;
        self
    }

    /// Never answers requests for `method`.
    #[must_use]
    pub fn never_answer(mut self, method: &str) -> Self {
        self.silent_methods.push(method.to_owned());
        self
    }

    /// Waits `delay` before answering `method`.
    #[must_use]
    pub fn delay(mut self, method: &str, delay: Duration) -> Self {
        self.delays.push((method.to_owned(), delay));
        self
    }

    /// Holds `textDocument/*` responses until `size` are pending, then sends
    /// them in reverse order.
    #[must_use]
    pub const fn answer_in_reverse_batches(mut self, size: usize) -> Self {
        self.batch = size;
        self
    }

    /// Publishes a diagnostic reading `version N` on every open or change.
    #[must_use]
    pub const fn publish_diagnostics(mut self) -> Self {
        self.publish_diagnostics = true;
        self
    }

    /// Publishes a diagnostic reading `after close` once a document closes.
    #[must_use]
    pub const fn publish_after_close(mut self) -> Self {
        self.publish_after_close = true;
        self
    }

    /// Stops reading for `pause` after the notification `method` arrives.
    #[must_use]
    pub fn stall_on(mut self, method: &str, pause: Duration) -> Self {
        self.stalls.push((method.to_owned(), pause));
        self
    }

    /// Answers the notification `method` by writing about `bytes` of log
    /// messages with a `workspace/configuration` request in the middle,
    /// without reading in between.
    #[must_use]
    pub fn chatter_on(mut self, method: &str, bytes: usize) -> Self {
        self.chatter = Some((method.to_owned(), bytes));
        self
    }

    /// Sends a `workspace/configuration` request after `initialized`.
    #[must_use]
    pub const fn request_configuration(mut self) -> Self {
        self.configuration_request = true;
        self
    }

    /// Closes the connection abruptly when `method` arrives.
    #[must_use]
    pub fn crash_on(mut self, method: &str) -> Self {
        self.crash_on = Some(method.to_owned());
        self
    }
}

/// What the fake servers observed.
#[derive(Debug, Default)]
struct Journal {
    received: Vec<String>,
    replies: Vec<JsonRpcResponse>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Launches scripted in-process servers.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    script: FakeScript,
    journal: Arc<Mutex<Journal>>,
    launches: Arc<AtomicUsize>,
}

impl FakeLauncher {
    /// Creates a launcher whose servers follow `script`.
    #[must_use]
    pub fn new(script: FakeScript) -> Self {
        Self {
            script,
            journal: Arc::default(),
            launches: Arc::default(),
        }
    }

    /// Number of servers launched so far.
    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Methods received by all servers, in arrival order.
    #[must_use]
    pub fn received(&self) -> Vec<String> {
        lock(&self.journal).received.clone()
    }

    /// Number of times `method` was received.
    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        lock(&self.journal)
            .received
            .iter()
            .filter(|received| received.as_str() == method)
            .count()
    }

    /// Responses the client sent to server-initiated requests.
    #[must_use]
    pub fn client_replies(&self) -> Vec<JsonRpcResponse> {
        lock(&self.journal).replies.clone()
    }
}

impl ServerLauncher for FakeLauncher {
    fn launch(
        &self,
        language: &str,
        command: &ServerCommand,
    ) -> Result<ServerConnection, OrchestratorError> {
        let launch = self.launches.fetch_add(1, Ordering::SeqCst);
        let spawn_failed = |error: io::Error| OrchestratorError::SpawnFailed {
            command: command.program().to_owned(),
            source: Arc::new(error),
        };
        let (client_reader, server_writer) = io::pipe().map_err(spawn_failed)?;
        let (server_reader, client_writer) = io::pipe().map_err(spawn_failed)?;

        let server = FakeServer {
            script: self.script.clone(),
            initialize_silently: launch < self.script.silent_initializations,
            journal: Arc::clone(&self.journal),
            held: Vec::new(),
            next_id: 1,
        };
        let thread = thread::Builder::new()
            .name(format!("fake-lsp-{language}"))
            .spawn(move || server.run(server_reader, server_writer))
            .map_err(spawn_failed)?;

        debug!(target: FAKE_TARGET, language, launch, "fake language server started");
        Ok(ServerConnection {
            reader: Box::new(client_reader),
            writer: Box::new(client_writer),
            handle: Box::new(FakeHandle {
                thread: Some(thread),
            }),
        })
    }
}

struct FakeHandle {
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle for FakeHandle {
    fn terminate(&mut self, grace: Duration) {
        if let Some(thread) = self.thread.take()
            && !join_within(thread, grace.max(Duration::from_millis(500)))
        {
            debug!(target: FAKE_TARGET, "fake language server still running; detaching");
        }
    }
}

struct FakeServer {
    script: FakeScript,
    initialize_silently: bool,
    journal: Arc<Mutex<Journal>>,
    held: Vec<JsonRpcResponse>,
    next_id: i64,
}

type Frames = FrameWriter<io::PipeWriter>;

impl FakeServer {
    fn run(mut self, reader: io::PipeReader, writer: io::PipeWriter) {
        let mut incoming = FrameReader::new(BufReader::new(reader));
        let mut outgoing = FrameWriter::new(writer);
        while let Ok(body) = incoming.receive() {
            let Ok(message) = IncomingMessage::parse(&body) else {
                continue;
            };
            let keep_going = match message {
                IncomingMessage::Request { id, method, params } => {
                    self.on_request(&mut outgoing, id, &method, params.as_ref())
                }
                IncomingMessage::Notification { method, params } => {
                    self.on_notification(&mut outgoing, &method, params.as_ref())
                }
                IncomingMessage::Response { response, .. } => {
                    lock(&self.journal).replies.push(response);
                    true
                }
            };
            if !keep_going {
                break;
            }
        }
        debug!(target: FAKE_TARGET, "fake language server stopped");
    }

    fn on_request(
        &mut self,
        out: &mut Frames,
        id: Value,
        method: &str,
        params: Option<&Value>,
    ) -> bool {
        lock(&self.journal).received.push(method.to_owned());
        if self.script.crash_on.as_deref() == Some(method) {
            return false;
        }
        if self.script.silent_methods.iter().any(|silent| silent == method)
            || (method == "initialize" && self.initialize_silently)
        {
            return true;
        }
        if let Some((_, delay)) = self.script.delays.iter().find(|(name, _)| name == method) {
            thread::sleep(*delay);
        }

        let reply = match answer(method, params) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        };
        if self.script.batch > 1 && method.starts_with("textDocument/") {
            self.held.push(reply);
            if self.held.len() < self.script.batch {
                return true;
            }
            let batch: Vec<_> = self.held.drain(..).rev().collect();
            return batch.iter().all(|held| send(out, held));
        }
        send(out, &reply)
    }

    fn on_notification(&mut self, out: &mut Frames, method: &str, params: Option<&Value>) -> bool {
        lock(&self.journal).received.push(method.to_owned());
        if self.script.crash_on.as_deref() == Some(method) {
            return false;
        }
        if let Some((_, pause)) = self.script.stalls.iter().find(|(name, _)| name == method) {
            thread::sleep(*pause);
        }
        let chatter = self
            .script
            .chatter
            .as_ref()
            .filter(|(name, _)| name == method)
            .map(|(_, bytes)| *bytes);
        if let Some(bytes) = chatter {
            return self.chatter(out, bytes);
        }

        let document = params.and_then(|value| value.get("textDocument"));
        let uri = document.and_then(|doc| doc.get("uri")).cloned();
        match method {
            "exit" => false,
            "initialized" if self.script.configuration_request => self.request_configuration(out),
            "textDocument/didOpen" | "textDocument/didChange" if self.script.publish_diagnostics => {
                let version = document
                    .and_then(|doc| doc.get("version"))
                    .and_then(Value::as_i64)
                    .unwrap_or_default();
                uri.is_none_or(|target| {
                    send(out, &diagnostics_for(target, version, &format!("version {version}")))
                })
            }
            "textDocument/didClose" if self.script.publish_after_close => {
                uri.is_none_or(|target| send(out, &diagnostics_for(target, 0, "after close")))
            }
            _ => true,
        }
    }

    fn request_configuration(&mut self, out: &mut Frames) -> bool {
        let id = self.next_id;
        self.next_id += 1;
        let request = JsonRpcRequest::with_id(
            id,
            "workspace/configuration",
            Some(json!({"items": [{"section": "fake"}]})),
        );
        send(out, &request)
    }

    fn chatter(&mut self, out: &mut Frames, bytes: usize) -> bool {
        const CHUNK: usize = 16 * 1024;
        let message = "x".repeat(CHUNK);
        // Four chunks fill a default pipe buffer before the request goes out.
        let chunks = bytes.div_ceil(CHUNK).max(8);
        for chunk in 0..chunks {
            if chunk == 4 && !self.request_configuration(out) {
                return false;
            }
            let log = JsonRpcNotification::new(
                "window/logMessage",
                Some(json!({"type": 4, "message": message})),
            );
            if !send(out, &log) {
                return false;
            }
        }
        true
    }
}

fn send(out: &mut Frames, message: &impl serde::Serialize) -> bool {
    serde_json::to_vec(message)
        .ok()
        .is_some_and(|body| out.send(&body).is_ok())
}

fn diagnostics_for(uri: Value, version: i64, message: &str) -> JsonRpcNotification {
    JsonRpcNotification::new(
        "textDocument/publishDiagnostics",
        Some(json!({
            "uri": uri,
            "version": version,
            "diagnostics": [{
                "range": {
                    "start": {"line": 0, "character": 0},
                    "end": {"line": 0, "character": 1}
                },
                "severity": 1,
                "source": "fake-ls",
                "message": message
            }]
        })),
    )
}

fn answer(method: &str, params: Option<&Value>) -> Result<Value, JsonRpcError> {
    let uri = params
        .and_then(|value| value.pointer("/textDocument/uri"))
        .cloned()
        .unwrap_or(Value::Null);
    let position = params
        .and_then(|value| value.get("position"))
        .cloned()
        .unwrap_or_else(|| json!({"line": 0, "character": 0}));
    let line = position.get("line").and_then(Value::as_u64).unwrap_or_default();
    let character = position
        .get("character")
        .and_then(Value::as_u64)
        .unwrap_or_default();

    match method {
        "initialize" => Ok(json!({
            "capabilities": {
                "textDocumentSync": 1,
                "hoverProvider": true,
                "definitionProvider": true,
                "completionProvider": {"triggerCharacters": ["."]}
            },
            "serverInfo": {"name": "fake-ls", "version": "0.0.0"}
        })),
        "shutdown" => Ok(Value::Null),
        "textDocument/hover" => Ok(json!({
            "contents": {
                "kind": "markdown",
                "value": format!("hover {line}:{character}")
            }
        })),
        "textDocument/completion" => Ok(json!([
            {"label": format!("item-{line}-{character}")}
        ])),
        "textDocument/definition" => Ok(json!({
            "uri": uri,
            "range": {"start": position.clone(), "end": position}
        })),
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("unhandled method {other}"),
        )),
    }
}
