//! Local terminal control.
//!
//! The controlling terminal is process-wide state. [`TerminalBackend`] is the
//! seam the session controller uses to read its size and switch it into raw
//! mode, and [`RawModeGuard`] ties the raw-mode period to a scope: the
//! snapshot taken on entry is restored exactly once, when the guard drops.

use std::fmt;
use std::io;

use nix::sys::termios::{self, SetArg, Termios};

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TermSize {
    /// Width in columns.
    pub cols: u16,
    /// Height in rows.
    pub rows: u16,
}

impl TermSize {
    /// Creates a new size.
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Access to the local terminal.
pub trait TerminalBackend {
    /// Saved terminal attributes.
    type Snapshot;

    /// Reads the current terminal size.
    fn size(&self) -> io::Result<TermSize>;

    /// Switches the terminal to raw mode and returns the prior attributes.
    fn enter_raw_mode(&self) -> io::Result<Self::Snapshot>;

    /// Restores previously captured attributes.
    fn restore(&self, snapshot: &Self::Snapshot) -> io::Result<()>;
}

/// Scoped raw mode. Restores the captured snapshot on drop.
pub struct RawModeGuard<'a, B: TerminalBackend> {
    backend: &'a B,
    snapshot: Option<B::Snapshot>,
}

impl<'a, B: TerminalBackend> RawModeGuard<'a, B> {
    /// Enters raw mode on `backend`.
    ///
    /// When entering fails nothing was captured, so no guard exists and
    /// nothing will be restored.
    pub fn enter(backend: &'a B) -> io::Result<Self> {
        let snapshot = backend.enter_raw_mode()?;
        tracing::debug!("Entered raw mode");
        Ok(Self {
            backend,
            snapshot: Some(snapshot),
        })
    }

    /// Restores the terminal now instead of at drop.
    pub fn restore(mut self) -> io::Result<()> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> io::Result<()> {
        match self.snapshot.take() {
            Some(snapshot) => {
                self.backend.restore(&snapshot)?;
                tracing::debug!("Restored terminal mode");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<B: TerminalBackend> Drop for RawModeGuard<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = self.restore_inner() {
            tracing::error!(error = %e, "Failed to restore terminal mode");
        }
    }
}

/// The process's controlling terminal, addressed through stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tty;

impl TerminalBackend for Tty {
    type Snapshot = Termios;

    fn size(&self) -> io::Result<TermSize> {
        let (cols, rows) = crossterm::terminal::size()?;
        Ok(TermSize::new(cols, rows))
    }

    fn enter_raw_mode(&self) -> io::Result<Termios> {
        let stdin = io::stdin();
        let original = termios::tcgetattr(&stdin).map_err(io::Error::from)?;

        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw).map_err(io::Error::from)?;

        Ok(original)
    }

    fn restore(&self, snapshot: &Termios) -> io::Result<()> {
        termios::tcsetattr(io::stdin(), SetArg::TCSANOW, snapshot).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct FakeTerminal {
        fail_raw: bool,
        fail_restore: bool,
        entered: Cell<u32>,
        restored: Cell<u32>,
    }

    impl TerminalBackend for FakeTerminal {
        type Snapshot = &'static str;

        fn size(&self) -> io::Result<TermSize> {
            Ok(TermSize::new(80, 24))
        }

        fn enter_raw_mode(&self) -> io::Result<&'static str> {
            if self.fail_raw {
                return Err(io::Error::new(io::ErrorKind::Other, "not a tty"));
            }
            self.entered.set(self.entered.get() + 1);
            Ok("cooked")
        }

        fn restore(&self, snapshot: &&'static str) -> io::Result<()> {
            assert_eq!(*snapshot, "cooked");
            self.restored.set(self.restored.get() + 1);
            if self.fail_restore {
                return Err(io::Error::new(io::ErrorKind::Other, "gone"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let term = FakeTerminal::default();
        {
            let _guard = RawModeGuard::enter(&term).unwrap();
            assert_eq!(term.entered.get(), 1);
            assert_eq!(term.restored.get(), 0);
        }
        assert_eq!(term.restored.get(), 1);
    }

    #[test]
    fn test_explicit_restore_runs_once() {
        let term = FakeTerminal::default();
        let guard = RawModeGuard::enter(&term).unwrap();
        guard.restore().unwrap();
        assert_eq!(term.restored.get(), 1);
    }

    #[test]
    fn test_failed_entry_never_restores() {
        let term = FakeTerminal {
            fail_raw: true,
            ..Default::default()
        };
        assert!(RawModeGuard::enter(&term).is_err());
        assert_eq!(term.restored.get(), 0);
    }

    #[test]
    fn test_restore_failure_is_not_retried() {
        let term = FakeTerminal {
            fail_restore: true,
            ..Default::default()
        };
        let guard = RawModeGuard::enter(&term).unwrap();
        assert!(guard.restore().is_err());
        assert_eq!(term.restored.get(), 1);
    }

    #[test]
    fn test_guard_restores_during_unwind() {
        let term = FakeTerminal::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = RawModeGuard::enter(&term).unwrap();
            panic!("relay blew up");
        }));
        assert!(result.is_err());
        assert_eq!(term.restored.get(), 1);
    }

    #[test]
    fn test_term_size_display() {
        assert_eq!(TermSize::new(120, 40).to_string(), "120x40");
    }
}
