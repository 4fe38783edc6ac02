//! # termhop Client Library
//!
//! This crate opens interactive shells on hosts from a termhop inventory.
//!
//! ## Overview
//!
//! - **Connector**: dials a target over SSH and authenticates with its key or password
//! - **Terminal**: local terminal size and scoped raw mode
//! - **Session**: PTY negotiation, resize propagation and byte relays, driven
//!   by a small state machine that always restores the terminal
//!
//! ## Architecture
//!
//! ```text
//! inventory::Inventory ──► connector::connect ──► session::TerminalController
//!     (pick a target)        (SshSession)            (Init → … → Closed)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use client::config::Config;
//! use client::connector;
//! use client::session::{spawn_resize_events, ControllerOptions, LocalStreams, TerminalController};
//! use client::terminal::{TerminalBackend, Tty};
//! use inventory::Inventory;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let inventory = Inventory::load(&config.inventory.path)?;
//!     let target = inventory.resolve("db1")?;
//!
//!     let mut session = connector::connect(target, &config.connection).await?;
//!     let resizes = spawn_resize_events(|| Tty.size())?;
//!     let controller = TerminalController::new(Tty, ControllerOptions::from(&config.terminal));
//!
//!     let report = controller.run(&mut session, LocalStreams::stdio(), resizes).await;
//!     if let Some(message) = &report.message {
//!         println!("{}", message);
//!     }
//!     std::process::exit(report.exit_code());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`connector`]: SSH connection and authentication
//! - [`terminal`]: Local terminal control
//! - [`session`]: The interactive session

pub mod config;
pub mod connector;
pub mod session;
pub mod terminal;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export connector types for convenience
pub use connector::{connect, ConnectError, HostKeyPolicy};

// Re-export session types for convenience
pub use session::{
    ControllerOptions, ExitStatus, LocalStreams, RemoteSession, SessionError, SessionReport,
    SessionState, SshSession, TerminalController,
};

// Re-export terminal types for convenience
pub use terminal::{RawModeGuard, TermSize, TerminalBackend, Tty};
