// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local terminal attributes: raw-mode entry/restore and window-size
//! queries for the user-facing side of the proxy.

use std::os::fd::{AsRawFd, BorrowedFd};

use nix::sys::termios;

/// RAII guard that restores the original terminal attributes on drop.
///
/// Stores a raw fd (stdin) and the original termios state. The fd is valid
/// for the lifetime of the process (stdin never closes), so this is safe.
pub struct RawModeGuard {
    fd: i32,
    original: termios::Termios,
}

impl RawModeGuard {
    /// Enter raw mode on stdin, if it is a terminal. Returns `None` when
    /// standard input is not a tty (e.g. piped input) rather than failing.
    pub fn enter() -> anyhow::Result<Option<Self>> {
        let fd = std::io::stdin().as_raw_fd();
        if nix::unistd::isatty(borrow_fd(fd)).unwrap_or(false) {
            let borrowed = borrow_fd(fd);
            let original = termios::tcgetattr(borrowed)?;
            let mut raw = original.clone();
            termios::cfmakeraw(&mut raw);
            termios::tcsetattr(borrowed, termios::SetArg::TCSAFLUSH, &raw)?;
            Ok(Some(Self { fd, original }))
        } else {
            Ok(None)
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let borrowed = borrow_fd(self.fd);
        let _ = termios::tcsetattr(borrowed, termios::SetArg::TCSAFLUSH, &self.original);
    }
}

/// Create a `BorrowedFd` from a raw fd that we know is valid.
fn borrow_fd(fd: i32) -> BorrowedFd<'static> {
    // SAFETY: the only callers pass the stdin fd, valid for process lifetime.
    #[allow(unsafe_code)]
    unsafe {
        BorrowedFd::borrow_raw(fd)
    }
}

/// Read the current terminal dimensions from the given fd via `TIOCGWINSZ`.
pub fn terminal_size(fd: &impl AsRawFd) -> Option<(u16, u16)> {
    let mut ws = nix::libc::winsize { ws_row: 0, ws_col: 0, ws_xpixel: 0, ws_ypixel: 0 };
    // SAFETY: TIOCGWINSZ reads terminal size into a winsize struct; fd is
    // owned by the caller and ws is a properly-initialized stack variable
    // with the ioctl's expected layout.
    #[allow(unsafe_code)]
    let ret = unsafe { nix::libc::ioctl(fd.as_raw_fd(), nix::libc::TIOCGWINSZ, &mut ws) };
    if ret == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some((ws.ws_col, ws.ws_row))
    } else {
        None
    }
}
