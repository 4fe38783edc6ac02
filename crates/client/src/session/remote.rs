//! The remote side of an interactive session.
//!
//! [`RemoteSession`] is what the controller drives: one authenticated
//! command channel that can allocate a PTY, follow window-size changes,
//! expose its three byte streams, start a shell and report how the remote
//! command ended.

use std::fmt;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::terminal::TermSize;

/// Errors reported by a remote session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The server answered a channel request with a failure.
    #[error("{0} request rejected by server")]
    Rejected(&'static str),

    /// The operation is not valid in the session's current phase.
    #[error("{0}")]
    InvalidState(&'static str),

    /// The channel closed before the operation completed.
    #[error("channel closed")]
    Closed,

    /// The SSH transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for remote session operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Boxed stream writing to the remote side.
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed stream reading from the remote side.
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// The three independent byte streams of a session.
pub struct RemoteStreams {
    /// Bytes written here reach the remote command's stdin.
    pub stdin: RemoteWriter,
    /// The remote command's stdout.
    pub stdout: RemoteReader,
    /// The remote command's stderr.
    pub stderr: RemoteReader,
}

/// How the remote command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// The command exited with a status code.
    Code(u32),
    /// The command was terminated by a signal.
    Signal {
        /// Signal name without the `SIG` prefix.
        name: String,
        /// Whether a core was dumped.
        core_dumped: bool,
        /// Error message sent by the server, possibly empty.
        message: String,
    },
    /// The channel closed without an exit status.
    Missing,
}

impl ExitStatus {
    /// Returns true for a zero exit code.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    /// Process exit code to report for this status.
    ///
    /// Only the low 8 bits of a process exit code survive, so codes outside
    /// `1..=255` other than zero are reported as 1.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Code(0) => 0,
            ExitStatus::Code(code @ 1..=255) => *code as i32,
            _ => 1,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exited with status {}", code),
            ExitStatus::Signal {
                name,
                core_dumped,
                message,
            } => {
                write!(f, "terminated by signal {}", name)?;
                if *core_dumped {
                    write!(f, " (core dumped)")?;
                }
                if !message.is_empty() {
                    write!(f, ": {}", message)?;
                }
                Ok(())
            }
            ExitStatus::Missing => write!(f, "exited without reporting a status"),
        }
    }
}

/// A live, authenticated remote command channel.
///
/// Calls are expected in this order: [`request_pty`](Self::request_pty),
/// [`open_streams`](Self::open_streams), [`request_shell`](Self::request_shell),
/// then [`wait`](Self::wait). [`window_change`](Self::window_change) is valid
/// any time after the PTY is allocated, and [`close`](Self::close) at any time.
#[allow(async_fn_in_trait)]
pub trait RemoteSession {
    /// Allocates a pseudo-terminal of the given type and size.
    async fn request_pty(&mut self, term: &str, size: TermSize) -> RemoteResult<()>;

    /// Resizes the already-allocated pseudo-terminal.
    async fn window_change(&mut self, size: TermSize) -> RemoteResult<()>;

    /// Opens the stdin, stdout and stderr streams. Valid once.
    fn open_streams(&mut self) -> RemoteResult<RemoteStreams>;

    /// Starts the remote login shell.
    async fn request_shell(&mut self) -> RemoteResult<()>;

    /// Waits for the remote command to end.
    async fn wait(&mut self) -> RemoteResult<ExitStatus>;

    /// Closes the session and its connection. Safe to call more than once.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_success() {
        assert!(ExitStatus::Code(0).success());
        assert!(!ExitStatus::Code(1).success());
        assert!(!ExitStatus::Missing.success());
    }

    #[test]
    fn test_exit_status_code_beyond_a_byte_is_failure() {
        assert_eq!(ExitStatus::Code(256).code(), 1);
        assert_eq!(ExitStatus::Code(512).code(), 1);
        assert_eq!(ExitStatus::Code(u32::MAX).code(), 1);
    }

    #[test]
    fn test_exit_status_code() {
        assert_eq!(ExitStatus::Code(0).code(), 0);
        assert_eq!(ExitStatus::Code(42).code(), 42);
        assert_eq!(ExitStatus::Code(255).code(), 255);
        assert_eq!(ExitStatus::Missing.code(), 1);
        assert_eq!(
            ExitStatus::Signal {
                name: "KILL".to_string(),
                core_dumped: false,
                message: String::new(),
            }
            .code(),
            1
        );
    }

    #[test]
    fn test_exit_status_display() {
        assert_eq!(ExitStatus::Code(3).to_string(), "exited with status 3");
        assert_eq!(
            ExitStatus::Signal {
                name: "SEGV".to_string(),
                core_dumped: true,
                message: "boom".to_string(),
            }
            .to_string(),
            "terminated by signal SEGV (core dumped): boom"
        );
        assert_eq!(
            ExitStatus::Missing.to_string(),
            "exited without reporting a status"
        );
    }

    #[test]
    fn test_remote_error_display() {
        assert_eq!(
            RemoteError::Rejected("pty-req").to_string(),
            "pty-req request rejected by server"
        );
        assert_eq!(RemoteError::Closed.to_string(), "channel closed");
    }
}
