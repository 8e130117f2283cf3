// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pseudo-terminal core: fork the supervised agent under a PTY and expose
//! non-blocking read/write plus window-size control to the main loop.

pub mod nbio;
pub mod spawn;
pub mod term;

pub use spawn::{ExitStatus, NativePty};
pub use term::{terminal_size, RawModeGuard};
