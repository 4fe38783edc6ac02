//! Window-size propagation.
//!
//! SIGWINCH is turned into a stream of [`TermSize`] events by
//! [`spawn_resize_events`]; the controller feeds each event to a
//! [`ResizeWatcher`], which forwards it to the remote PTY only when the size
//! actually changed.

use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use super::remote::RemoteSession;
use crate::terminal::TermSize;

/// Capacity of the resize event queue.
pub const RESIZE_QUEUE_CAPACITY: usize = 16;

/// Tracks the size last applied to the remote PTY.
#[derive(Debug)]
pub struct ResizeWatcher {
    last_known: TermSize,
}

impl ResizeWatcher {
    /// Creates a watcher for a PTY allocated at `initial`.
    pub fn new(initial: TermSize) -> Self {
        Self {
            last_known: initial,
        }
    }

    /// Returns the size last applied to the remote PTY.
    pub fn last_known(&self) -> TermSize {
        self.last_known
    }

    /// Applies a window-change notification.
    ///
    /// Sends a resize request only when `current` differs from the last-known
    /// size. The last-known size moves only after the request succeeds, so a
    /// failed request is retried on the next notification. Returns whether a
    /// resize was applied.
    pub async fn apply<S: RemoteSession>(&mut self, session: &mut S, current: TermSize) -> bool {
        if current == self.last_known {
            tracing::trace!(size = %current, "Window size unchanged");
            return false;
        }

        match session.window_change(current).await {
            Ok(()) => {
                tracing::debug!(
                    cols = current.cols,
                    rows = current.rows,
                    "Resized remote PTY"
                );
                self.last_known = current;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, size = %current, "Unable to send window-change request");
                false
            }
        }
    }
}

/// Listens for SIGWINCH and emits the terminal size read after each signal.
///
/// The listener task runs until the receiver is dropped or the process exits.
pub fn spawn_resize_events<F>(read_size: F) -> io::Result<mpsc::Receiver<TermSize>>
where
    F: Fn() -> io::Result<TermSize> + Send + 'static,
{
    let mut winch = signal(SignalKind::window_change())?;
    let (tx, rx) = mpsc::channel(RESIZE_QUEUE_CAPACITY);

    tokio::spawn(async move {
        while winch.recv().await.is_some() {
            match read_size() {
                Ok(size) => {
                    if tx.send(size).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read terminal size after window change");
                }
            }
        }
    });

    Ok(rx)
}
