//! The interactive session state machine.
//!
//! A [`TerminalController`] takes a live [`RemoteSession`] and the local
//! terminal through `Init → PtyRequested → Streaming → Draining → Closed`.
//! `Closed` is reachable from every state, and whatever path leads there the
//! session is closed first and the local terminal restored last, exactly once.

use std::fmt;
use std::io;

use chrono::Local;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::relay::{spawn_input_relay, spawn_output_relay, RelayResult};
use super::remote::{ExitStatus, RemoteError, RemoteSession};
use super::resize::ResizeWatcher;
use crate::config::{TerminalConfig, DEFAULT_TERM};
use crate::terminal::{RawModeGuard, TermSize, TerminalBackend};

/// Default size of the local input read buffer.
pub const DEFAULT_INPUT_BUFFER: usize = 128;

/// Phases of an interactive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing negotiated yet.
    Init,
    /// Raw mode entered and the PTY requested.
    PtyRequested,
    /// Shell running, bytes flowing in both directions.
    Streaming,
    /// Remote output ended; collecting the exit status.
    Draining,
    /// Session closed and terminal restored.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::PtyRequested => "pty-requested",
            SessionState::Streaming => "streaming",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Errors that end an interactive session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to read local terminal size: {0}")]
    TerminalSize(#[source] io::Error),

    #[error("failed to enter raw mode: {0}")]
    RawMode(#[source] io::Error),

    #[error("failed to allocate remote PTY: {0}")]
    PtyRequest(#[source] RemoteError),

    #[error("failed to open session streams: {0}")]
    StreamOpen(#[source] RemoteError),

    #[error("failed to start remote shell: {0}")]
    ShellStart(#[source] RemoteError),

    #[error("remote command {0}")]
    RemoteExit(ExitStatus),
}

impl SessionError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::RemoteExit(status) => match status.code() {
                0 => 1,
                code => code,
            },
            _ => 1,
        }
    }
}

/// Tunables for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// PTY type used when `TERM` is unset or empty.
    pub default_term: String,
    /// Chunk size for reading local input.
    pub input_buffer: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            default_term: DEFAULT_TERM.to_string(),
            input_buffer: DEFAULT_INPUT_BUFFER,
        }
    }
}

impl From<&TerminalConfig> for ControllerOptions {
    fn from(config: &TerminalConfig) -> Self {
        Self {
            default_term: config.default_term.clone(),
            input_buffer: config.input_buffer,
        }
    }
}

/// Picks the PTY type from the `TERM` value, falling back to `default`.
pub fn resolve_term(env_term: Option<String>, default: &str) -> String {
    env_term
        .filter(|term| !term.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Boxed local input.
pub type LocalReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed local output.
pub type LocalWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The local side of the relays.
pub struct LocalStreams {
    pub input: LocalReader,
    pub output: LocalWriter,
    pub error: LocalWriter,
}

impl LocalStreams {
    /// The process's standard streams.
    pub fn stdio() -> Self {
        Self {
            input: Box::new(tokio::io::stdin()),
            output: Box::new(tokio::io::stdout()),
            error: Box::new(tokio::io::stderr()),
        }
    }
}

/// What a finished session reports to its caller.
#[derive(Debug)]
pub struct SessionReport {
    /// Every state visited, in order.
    pub history: Vec<SessionState>,
    /// Final status message. Only present for sessions that reached streaming.
    pub message: Option<String>,
    /// How the session ended.
    pub outcome: Result<(), SessionError>,
}

impl SessionReport {
    /// Process exit code for this session.
    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            Ok(()) => 0,
            Err(e) => e.exit_code(),
        }
    }

    /// Whether the session got as far as streaming.
    pub fn reached_streaming(&self) -> bool {
        self.history.contains(&SessionState::Streaming)
    }
}

/// Message used when no relay recorded how the session ended.
pub fn closed_by_remote_message() -> String {
    format!(
        "the connection was closed on the remote side on {}",
        Local::now().format("%d %b %y %H:%M %Z")
    )
}

/// State history with debug logging of each transition.
#[derive(Debug)]
struct StateTracker {
    history: Vec<SessionState>,
}

impl StateTracker {
    fn new() -> Self {
        tracing::debug!(state = %SessionState::Init, "Session state");
        Self {
            history: vec![SessionState::Init],
        }
    }

    fn enter(&mut self, next: SessionState) {
        tracing::debug!(state = %next, "Session state");
        self.history.push(next);
    }

    fn current(&self) -> SessionState {
        self.history
            .last()
            .copied()
            .unwrap_or(SessionState::Init)
    }
}

/// Drives one interactive session over a local terminal backend.
pub struct TerminalController<B: TerminalBackend> {
    backend: B,
    options: ControllerOptions,
}

impl<B: TerminalBackend> TerminalController<B> {
    /// Creates a controller for `backend`.
    pub fn new(backend: B, options: ControllerOptions) -> Self {
        Self { backend, options }
    }

    /// Returns the terminal backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Runs the session to completion.
    ///
    /// `resizes` carries window-size notifications; each one that differs
    /// from the last applied size becomes a window-change request. Whatever
    /// the outcome, `session` is closed before this returns and the local
    /// terminal is restored after that.
    pub async fn run<S: RemoteSession>(
        &self,
        session: &mut S,
        local: LocalStreams,
        resizes: mpsc::Receiver<TermSize>,
    ) -> SessionReport {
        let mut states = StateTracker::new();
        let relay_result = RelayResult::default();

        let outcome = match self.backend.size() {
            Err(e) => Err(SessionError::TerminalSize(e)),
            Ok(size) => {
                let term = resolve_term(std::env::var("TERM").ok(), &self.options.default_term);
                match RawModeGuard::enter(&self.backend) {
                    Err(e) => Err(SessionError::RawMode(e)),
                    Ok(guard) => {
                        let outcome = self
                            .converse(session, &mut states, local, resizes, &term, size, &relay_result)
                            .await;
                        session.close().await;
                        drop(guard);
                        outcome
                    }
                }
            }
        };

        // Failures before raw mode still close the connection.
        if states.current() == SessionState::Init {
            session.close().await;
        }
        states.enter(SessionState::Closed);

        let history = states.history;
        let message = history.contains(&SessionState::Streaming).then(|| {
            relay_result
                .get()
                .cloned()
                .unwrap_or_else(closed_by_remote_message)
        });

        if let Err(e) = &outcome {
            tracing::debug!(error = %e, "Session ended with error");
        }

        SessionReport {
            history,
            message,
            outcome,
        }
    }

    /// Everything between entering raw mode and closing the session.
    #[allow(clippy::too_many_arguments)]
    async fn converse<S: RemoteSession>(
        &self,
        session: &mut S,
        states: &mut StateTracker,
        local: LocalStreams,
        mut resizes: mpsc::Receiver<TermSize>,
        term: &str,
        size: TermSize,
        relay_result: &RelayResult,
    ) -> Result<(), SessionError> {
        states.enter(SessionState::PtyRequested);
        session
            .request_pty(term, size)
            .await
            .map_err(SessionError::PtyRequest)?;

        let streams = session.open_streams().map_err(SessionError::StreamOpen)?;

        let input = spawn_input_relay(
            local.input,
            streams.stdin,
            self.options.input_buffer,
            relay_result.clone(),
        );
        let stdout = spawn_output_relay("stdout", streams.stdout, local.output, relay_result.clone());
        let stderr = spawn_output_relay("stderr", streams.stderr, local.error, relay_result.clone());

        if let Err(e) = session.request_shell().await {
            input.abort();
            stdout.abort();
            stderr.abort();
            return Err(SessionError::ShellStart(e));
        }
        states.enter(SessionState::Streaming);

        let mut watcher = ResizeWatcher::new(size);
        let outputs = async {
            join_relay("stdout", stdout).await;
            join_relay("stderr", stderr).await;
        };
        tokio::pin!(outputs);

        let mut resizes_open = true;
        loop {
            tokio::select! {
                () = &mut outputs => break,
                event = resizes.recv(), if resizes_open => match event {
                    Some(current) => {
                        watcher.apply(session, current).await;
                    }
                    None => resizes_open = false,
                },
            }
        }

        states.enter(SessionState::Draining);
        input.abort();

        let status = match session.wait().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to collect remote exit status");
                ExitStatus::Missing
            }
        };
        tracing::debug!(exit = %status, "Remote command finished");

        if status.success() {
            Ok(())
        } else {
            Err(SessionError::RemoteExit(status))
        }
    }
}

async fn join_relay(name: &'static str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        tracing::error!(stream = name, error = %e, "Output relay task failed");
    }
}
