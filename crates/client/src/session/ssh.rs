//! SSH implementation of [`RemoteSession`].
//!
//! Until the streams are opened, the session talks to its channel directly.
//! [`SshSession::open_streams`] then hands the channel to a pump task that
//! owns it for the rest of the session: it writes incoming data to the
//! stdout/stderr pipes, forwards the stdin pipe to the server, carries out
//! control requests (window change, shell start) and reports the exit status
//! once the channel closes.

use std::collections::VecDeque;

use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Sig};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::remote::{ExitStatus, RemoteError, RemoteResult, RemoteSession, RemoteStreams};
use crate::connector::ClientHandler;
use crate::terminal::TermSize;

/// Capacity of each in-process stream pipe.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Read size for forwarding stdin to the channel.
const STDIN_CHUNK_SIZE: usize = 4096;

/// Capacity of the control request queue.
const CONTROL_CAPACITY: usize = 16;

/// Extended data type code for stderr.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Requests served by the pump task once it owns the channel.
enum Control {
    WindowChange {
        size: TermSize,
        reply: oneshot::Sender<RemoteResult<()>>,
    },
    Shell {
        reply: oneshot::Sender<RemoteResult<()>>,
    },
}

/// An authenticated SSH connection with one session channel.
pub struct SshSession {
    handle: client::Handle<ClientHandler>,
    endpoint: String,
    channel: Option<Channel<Msg>>,
    control: Option<mpsc::Sender<Control>>,
    exit: Option<oneshot::Receiver<ExitStatus>>,
    pump: Option<JoinHandle<()>>,
    closed: bool,
}

impl SshSession {
    pub(crate) fn new(
        handle: client::Handle<ClientHandler>,
        channel: Channel<Msg>,
        endpoint: String,
    ) -> Self {
        Self {
            handle,
            endpoint,
            channel: Some(channel),
            control: None,
            exit: None,
            pump: None,
            closed: false,
        }
    }

    /// Returns the `address:port` this session is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_control(
        &self,
        make: impl FnOnce(oneshot::Sender<RemoteResult<()>>) -> Control,
    ) -> RemoteResult<()> {
        let control = self
            .control
            .as_ref()
            .ok_or(RemoteError::InvalidState("session streams are not open"))?;

        let (reply, response) = oneshot::channel();
        control
            .send(make(reply))
            .await
            .map_err(|_| RemoteError::Closed)?;
        response.await.map_err(|_| RemoteError::Closed)?
    }
}

fn transport(e: russh::Error) -> RemoteError {
    RemoteError::Transport(e.to_string())
}

/// Waits for the reply to a `want_reply` request on a channel nobody else reads.
async fn await_reply(channel: &mut Channel<Msg>, request: &'static str) -> RemoteResult<()> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err(RemoteError::Rejected(request)),
            Some(ChannelMsg::Close) | None => return Err(RemoteError::Closed),
            Some(other) => {
                tracing::trace!(?other, request, "Ignoring channel message while awaiting reply");
            }
        }
    }
}

impl RemoteSession for SshSession {
    async fn request_pty(&mut self, term: &str, size: TermSize) -> RemoteResult<()> {
        let channel = self.channel.as_mut().ok_or(RemoteError::InvalidState(
            "PTY must be requested before the streams are opened",
        ))?;

        channel
            .request_pty(
                true,
                term,
                u32::from(size.cols),
                u32::from(size.rows),
                0,
                0,
                &[],
            )
            .await
            .map_err(transport)?;

        await_reply(channel, "pty-req").await?;
        tracing::debug!(endpoint = %self.endpoint, term, size = %size, "PTY allocated");
        Ok(())
    }

    async fn window_change(&mut self, size: TermSize) -> RemoteResult<()> {
        if let Some(channel) = self.channel.as_ref() {
            return channel
                .window_change(u32::from(size.cols), u32::from(size.rows), 0, 0)
                .await
                .map_err(transport);
        }
        self.send_control(|reply| Control::WindowChange { size, reply })
            .await
    }

    fn open_streams(&mut self) -> RemoteResult<RemoteStreams> {
        let channel = self
            .channel
            .take()
            .ok_or(RemoteError::InvalidState("session streams already opened"))?;

        let (pump, ends) = ChannelPump::new(channel, self.endpoint.clone());
        self.pump = Some(tokio::spawn(pump.run()));
        self.control = Some(ends.control);
        self.exit = Some(ends.exit);

        Ok(RemoteStreams {
            stdin: Box::new(ends.stdin),
            stdout: Box::new(ends.stdout),
            stderr: Box::new(ends.stderr),
        })
    }

    async fn request_shell(&mut self) -> RemoteResult<()> {
        self.send_control(|reply| Control::Shell { reply }).await?;
        tracing::debug!(endpoint = %self.endpoint, "Remote shell started");
        Ok(())
    }

    async fn wait(&mut self) -> RemoteResult<ExitStatus> {
        let exit = self
            .exit
            .take()
            .ok_or(RemoteError::InvalidState("no running command to wait for"))?;
        exit.await.map_err(|_| RemoteError::Closed)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.control = None;
        self.channel = None;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!(endpoint = %self.endpoint, error = %e, "Disconnect failed");
        }
        tracing::debug!(endpoint = %self.endpoint, "Session closed");
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// What the pump reacts to on the channel.
#[derive(Debug, Clone, PartialEq)]
enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Success,
    Failure,
    Exit(ExitStatus),
    Eof,
    Close,
    Other,
}

impl From<ChannelMsg> for ChannelEvent {
    fn from(msg: ChannelMsg) -> Self {
        match msg {
            ChannelMsg::Data { data } => ChannelEvent::Stdout(data.to_vec()),
            ChannelMsg::ExtendedData { data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                ChannelEvent::Stderr(data.to_vec())
            }
            ChannelMsg::Success => ChannelEvent::Success,
            ChannelMsg::Failure => ChannelEvent::Failure,
            ChannelMsg::ExitStatus { exit_status } => ChannelEvent::Exit(ExitStatus::Code(exit_status)),
            ChannelMsg::ExitSignal {
                signal_name,
                core_dumped,
                error_message,
                ..
            } => ChannelEvent::Exit(ExitStatus::Signal {
                name: signal_name_of(&signal_name),
                core_dumped,
                message: error_message,
            }),
            ChannelMsg::Eof => ChannelEvent::Eof,
            ChannelMsg::Close => ChannelEvent::Close,
            other => {
                tracing::trace!(?other, "Unhandled channel message");
                ChannelEvent::Other
            }
        }
    }
}

/// Signal name as sent on the wire, without the `SIG` prefix.
fn signal_name_of(sig: &Sig) -> String {
    match sig {
        Sig::Custom(name) => name.clone(),
        standard => format!("{:?}", standard),
    }
}

/// The channel operations the pump needs once it owns the channel.
trait PumpChannel {
    /// Next event, or `None` once the channel is gone.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    async fn send_data(&mut self, data: &[u8]) -> RemoteResult<()>;

    async fn send_eof(&mut self) -> RemoteResult<()>;

    async fn window_change(&mut self, size: TermSize) -> RemoteResult<()>;

    /// Sends a shell request; the reply arrives as a later event.
    async fn request_shell(&mut self) -> RemoteResult<()>;
}

impl PumpChannel for Channel<Msg> {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.wait().await.map(ChannelEvent::from)
    }

    async fn send_data(&mut self, data: &[u8]) -> RemoteResult<()> {
        self.data(data).await.map_err(transport)
    }

    async fn send_eof(&mut self) -> RemoteResult<()> {
        self.eof().await.map_err(transport)
    }

    async fn window_change(&mut self, size: TermSize) -> RemoteResult<()> {
        Channel::window_change(self, u32::from(size.cols), u32::from(size.rows), 0, 0)
            .await
            .map_err(transport)
    }

    async fn request_shell(&mut self) -> RemoteResult<()> {
        Channel::request_shell(self, true).await.map_err(transport)
    }
}

/// The session's side of a pump.
struct PumpEnds {
    stdin: DuplexStream,
    stdout: DuplexStream,
    stderr: DuplexStream,
    control: mpsc::Sender<Control>,
    exit: oneshot::Receiver<ExitStatus>,
}

/// Owner of the channel while the session streams are open.
struct ChannelPump<C> {
    channel: C,
    control: mpsc::Receiver<Control>,
    stdin: DuplexStream,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    pending: VecDeque<oneshot::Sender<RemoteResult<()>>>,
    exit: ExitStatus,
    exit_tx: oneshot::Sender<ExitStatus>,
    endpoint: String,
}

impl<C: PumpChannel> ChannelPump<C> {
    fn new(channel: C, endpoint: String) -> (Self, PumpEnds) {
        let (stdin_writer, stdin_reader) = duplex(PIPE_CAPACITY);
        let (stdout_writer, stdout_reader) = duplex(PIPE_CAPACITY);
        let (stderr_writer, stderr_reader) = duplex(PIPE_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();

        let pump = Self {
            channel,
            control: control_rx,
            stdin: stdin_reader,
            stdout: Some(stdout_writer),
            stderr: Some(stderr_writer),
            pending: VecDeque::new(),
            exit: ExitStatus::Missing,
            exit_tx,
            endpoint,
        };
        let ends = PumpEnds {
            stdin: stdin_writer,
            stdout: stdout_reader,
            stderr: stderr_reader,
            control: control_tx,
            exit: exit_rx,
        };
        (pump, ends)
    }

    async fn run(mut self) {
        let mut buffer = vec![0u8; STDIN_CHUNK_SIZE];
        let mut stdin_open = true;
        let mut control_open = true;

        loop {
            tokio::select! {
                event = self.channel.next_event() => {
                    match event {
                        Some(event) => {
                            if !self.on_event(event).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                control = self.control.recv(), if control_open => {
                    match control {
                        Some(control) => self.on_control(control).await,
                        None => control_open = false,
                    }
                }
                read = self.stdin.read(&mut buffer), if stdin_open => {
                    match read {
                        Ok(0) | Err(_) => {
                            stdin_open = false;
                            if let Err(e) = self.channel.send_eof().await {
                                tracing::debug!(error = %e, "Failed to send EOF");
                            }
                        }
                        Ok(n) => {
                            if let Err(e) = self.channel.send_data(&buffer[..n]).await {
                                tracing::warn!(error = %e, "Failed to send data to channel");
                                stdin_open = false;
                            }
                        }
                    }
                }
            }
        }

        // Dropping the pipe writers ends the output relays.
        self.stdout = None;
        self.stderr = None;
        for reply in self.pending.drain(..) {
            let _ = reply.send(Err(RemoteError::Closed));
        }

        tracing::debug!(endpoint = %self.endpoint, exit = %self.exit, "Channel closed");
        let _ = self.exit_tx.send(self.exit);
    }

    /// Handles one channel event. Returns false once the channel is closed.
    async fn on_event(&mut self, event: ChannelEvent) -> bool {
        match event {
            ChannelEvent::Stdout(data) => forward(&mut self.stdout, &data, "stdout").await,
            ChannelEvent::Stderr(data) => forward(&mut self.stderr, &data, "stderr").await,
            ChannelEvent::Success => {
                if let Some(reply) = self.pending.pop_front() {
                    let _ = reply.send(Ok(()));
                }
            }
            ChannelEvent::Failure => {
                if let Some(reply) = self.pending.pop_front() {
                    let _ = reply.send(Err(RemoteError::Rejected("shell")));
                }
            }
            ChannelEvent::Exit(status) => self.exit = status,
            ChannelEvent::Eof => {
                self.stdout = None;
                self.stderr = None;
            }
            ChannelEvent::Close => return false,
            ChannelEvent::Other => {}
        }
        true
    }

    async fn on_control(&mut self, control: Control) {
        match control {
            Control::WindowChange { size, reply } => {
                let result = self.channel.window_change(size).await;
                let _ = reply.send(result);
            }
            Control::Shell { reply } => match self.channel.request_shell().await {
                Ok(()) => self.pending.push_back(reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
        }
    }
}

/// Writes to a local pipe; a pipe whose reader is gone is dropped.
async fn forward(sink: &mut Option<DuplexStream>, data: &[u8], stream: &'static str) {
    let failed = match sink.as_mut() {
        Some(writer) => writer.write_all(data).await.is_err(),
        None => false,
    };
    if failed {
        tracing::debug!(stream, "Local reader gone, discarding remote output");
        *sink = None;
    }
}
