// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// The five error kinds a sidecar can encounter, used to tag log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing argv, unusable name — fatal at startup.
    Configuration,
    /// Raw-mode or window-size ioctl failure — degrades silently.
    Terminal,
    /// Child exit or unexpected EOF — terminates the loop cleanly.
    Child,
    /// Connect refused, non-2xx, bad JSON — logged, never propagated.
    Gateway,
    /// Malformed escape sequence or directive — offending bytes are dropped.
    Sanitizer,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Terminal => "terminal",
            Self::Child => "child",
            Self::Gateway => "gateway",
            Self::Sanitizer => "sanitizer",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
