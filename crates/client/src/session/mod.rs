//! Interactive remote terminal sessions.
//!
//! - [`remote`]: the [`RemoteSession`] abstraction the controller drives
//! - [`ssh`]: its SSH implementation
//! - [`controller`]: the session state machine
//! - [`relay`]: byte relays between local and remote streams
//! - [`resize`]: window-size propagation

pub mod controller;
pub mod relay;
pub mod remote;
pub mod resize;
pub mod ssh;

pub use controller::{
    closed_by_remote_message, ControllerOptions, LocalStreams, SessionError, SessionReport,
    SessionState, TerminalController,
};
pub use relay::RelayResult;
pub use remote::{ExitStatus, RemoteError, RemoteResult, RemoteSession, RemoteStreams};
pub use resize::{spawn_resize_events, ResizeWatcher};
pub use ssh::SshSession;
