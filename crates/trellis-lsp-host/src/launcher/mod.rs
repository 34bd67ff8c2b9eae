//! Starting language server processes.
//!
//! A [`ServerLauncher`] turns a [`ServerCommand`] into a
//! [`ServerConnection`]: a byte stream to read frames from, one to write
//! frames to, and a [`ServerHandle`] that stops the server. The production
//! [`ProcessLauncher`] spawns a child process and talks over its stdio.


use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::error::OrchestratorError;

/// Log target for process management.
const LAUNCHER_TARGET: &str = "trellis_lsp_host::launcher";

/// Program, arguments and working directory of a language server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<Utf8PathBuf>,
}

impl ServerCommand {
    /// Creates a command running `program` without arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the directory the server starts in.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Replaces the program while keeping the arguments and working
    /// directory.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Program to run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Directory the server starts in, if one was set.
    #[must_use]
    pub fn working_directory(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }
}

/// Stops a running server once its session is over.
pub trait ServerHandle: Send {
    /// Waits up to `grace` for the server to exit on its own, then forces it.
    fn terminate(&mut self, grace: Duration);
}

/// The streams and handle of a launched server.
pub struct ServerConnection {
    /// Messages from the server.
    pub reader: Box<dyn Read + Send>,
    /// Messages to the server.
    pub writer: Box<dyn Write + Send>,
    /// Stops the server.
    pub handle: Box<dyn ServerHandle>,
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection").finish_non_exhaustive()
    }
}

/// Starts language servers for sessions.
pub trait ServerLauncher: Send + Sync {
    /// Starts the server described by `command` for `language`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::BinaryNotFound`] or
    /// [`OrchestratorError::SpawnFailed`] when the server cannot start.
    fn launch(
        &self,
        language: &str,
        command: &ServerCommand,
    ) -> Result<ServerConnection, OrchestratorError>;
}

/// Launches servers as child processes speaking over stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Creates the launcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ServerLauncher for ProcessLauncher {
    fn launch(
        &self,
        language: &str,
        command: &ServerCommand,
    ) -> Result<ServerConnection, OrchestratorError> {
        debug!(
            target: LAUNCHER_TARGET,
            language,
            program = command.program(),
            args = ?command.arguments(),
            "spawning language server process"
        );

        let mut process = Command::new(command.program());
        process
            .args(command.arguments())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &command.working_dir {
            process.current_dir(dir);
        }

        let mut child = process.spawn().map_err(|error| {
            if error.kind() == io::ErrorKind::NotFound {
                OrchestratorError::BinaryNotFound {
                    command: command.program().to_owned(),
                    source: Arc::new(error),
                }
            } else {
                spawn_failed(command, error)
            }
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let mut handle = ChildHandle::new(language, child);
            handle.terminate(Duration::ZERO);
            return Err(spawn_failed(command, io::Error::other("stdio not captured")));
        };

        debug!(
            target: LAUNCHER_TARGET,
            language,
            pid = child.id(),
            "language server process spawned"
        );

        Ok(ServerConnection {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            handle: Box::new(ChildHandle::new(language, child)),
        })
    }
}

/// Joins `thread` if it finishes within `limit`.
///
/// Returns `false` and leaves the thread detached when it is still running
/// at the deadline.
pub(crate) fn join_within(thread: JoinHandle<()>, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while !thread.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if thread.join().is_err() {
        warn!(target: LAUNCHER_TARGET, "joined thread had panicked");
    }
    true
}

fn spawn_failed(command: &ServerCommand, error: io::Error) -> OrchestratorError {
    OrchestratorError::SpawnFailed {
        command: command.program().to_owned(),
        source: Arc::new(error),
    }
}

/// Handle over a spawned child process.
#[derive(Debug)]
pub(crate) struct ChildHandle {
    language: String,
    child: Child,
}

impl ChildHandle {
    pub(crate) fn new(language: &str, child: Child) -> Self {
        Self {
            language: language.to_owned(),
            child,
        }
    }

    fn kill(&mut self) {
        if let Err(error) = self.child.kill() {
            debug!(
                target: LAUNCHER_TARGET,
                language = %self.language,
                %error,
                "kill failed; the process has probably exited"
            );
        }
        if let Err(error) = self.child.wait() {
            warn!(
                target: LAUNCHER_TARGET,
                language = %self.language,
                %error,
                "failed to reap language server process"
            );
        }
    }
}

impl ServerHandle for ChildHandle {
    fn terminate(&mut self, grace: Duration) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    target: LAUNCHER_TARGET,
                    language = %self.language,
                    ?status,
                    "language server exited"
                );
                return;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    target: LAUNCHER_TARGET,
                    language = %self.language,
                    %error,
                    "failed to check process status"
                );
            }
        }

        if !grace.is_zero() {
            debug!(
                target: LAUNCHER_TARGET,
                language = %self.language,
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "waiting for language server to exit"
            );
            thread::sleep(grace);
            if let Ok(Some(status)) = self.child.try_wait() {
                debug!(
                    target: LAUNCHER_TARGET,
                    language = %self.language,
                    ?status,
                    "language server exited during grace period"
                );
                return;
            }
        }

        warn!(
            target: LAUNCHER_TARGET,
            language = %self.language,
            "language server did not exit gracefully, killing it"
        );
        self.kill();
    }
}
