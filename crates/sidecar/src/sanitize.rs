// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-stage ANSI/control-sequence sanitizer.
//!
//! Stage one is a streaming state machine that strips complete escape
//! sequences even when a read splits one across chunk boundaries. Stage
//! two is a regex-based cleanup applied at flush time, catching fragments
//! the streaming stage conservatively leaves behind (OSC sequences,
//! orphaned CSI parameters, DEC private modes, stray control bytes).

use regex::Regex;

/// Streaming ANSI stripper. Consumes arbitrary byte chunks and emits pure
/// text; escape sequences spanning chunk boundaries are coalesced.
#[derive(Debug)]
pub struct Sanitizer {
    state: State,
}

#[derive(Debug)]
enum State {
    Normal,
    /// Just saw ESC; the next byte decides what kind of sequence follows.
    Escape,
    /// Inside `ESC [ ... final`; final bytes fall in 0x40..=0x7e.
    Csi,
    /// Inside `ESC ] ... BEL` or `ESC ] ... ESC \`.
    Osc,
    /// Inside an OSC sequence, just saw an ESC that might be the `ST` terminator.
    OscEscape,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self { state: State::Normal }
    }

    /// Feed a chunk of raw agent output, returning the text with complete
    /// escape sequences removed. Malformed sequences degrade to dropped
    /// bytes rather than leaked escape characters.
    pub fn process(&mut self, data: &[u8]) -> String {
        let mut out = Vec::with_capacity(data.len());
        for &b in data {
            match self.state {
                State::Normal => {
                    if b == 0x1b {
                        self.state = State::Escape;
                    } else {
                        out.push(b);
                    }
                }
                State::Escape => {
                    self.state = match b {
                        b'[' => State::Csi,
                        b']' => State::Osc,
                        _ => State::Normal,
                    };
                }
                State::Csi => {
                    if (0x40..=0x7e).contains(&b) {
                        self.state = State::Normal;
                    }
                }
                State::Osc => {
                    if b == 0x07 {
                        self.state = State::Normal;
                    } else if b == 0x1b {
                        self.state = State::OscEscape;
                    }
                }
                State::OscEscape => {
                    self.state = if b == b'\\' { State::Normal } else { State::Osc };
                }
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Stage-two regex cleanup, compiled once and reused across flushes.
pub struct Stage2Cleaner {
    csi: Regex,
    osc: Regex,
    dec_private: Regex,
    c0_control: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

impl Stage2Cleaner {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            csi: Regex::new(r"\x1b\[[0-9;]*[A-Za-z]")?,
            osc: Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?")?,
            dec_private: Regex::new(r"\?\d+[hl]")?,
            c0_control: Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f]")?,
            spaces: Regex::new(r"[ \t]+")?,
            blank_lines: Regex::new(r"\n{3,}")?,
        })
    }

    /// Clean already stage-one-stripped text, additionally removing
    /// OSC sequences, orphaned CSI parameter fragments, DEC private mode
    /// toggles, lingering escape bytes, most C0 controls, and collapsing
    /// whitespace runs.
    pub fn clean(&self, text: &str) -> String {
        let text = self.csi.replace_all(text, "");
        let text = self.osc.replace_all(&text, "");
        let text = strip_orphaned_csi_params(&text);
        let text = self.dec_private.replace_all(&text, "");
        let text = text.replace('\x1b', "");
        let text = self.c0_control.replace_all(&text, "");
        let text = self.spaces.replace_all(&text, " ");
        let text = self.blank_lines.replace_all(&text, "\n\n");
        text.trim().to_owned()
    }
}

/// Strip orphaned CSI parameter fragments left behind once a real escape
/// character has already been removed: runs of `\d*;\d*` followed by one
/// of the CSI final bytes, but only when they contain a semicolon (so
/// legitimate text like "3m" or "10K" is never touched, since ordinary
/// words don't carry literal semicolons).
///
/// The `regex` crate has no lookaround, so this scans by hand; every byte
/// the pattern can match is ASCII, so slicing on byte offsets never splits
/// a multi-byte UTF-8 character.
fn strip_orphaned_csi_params(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if let Some(end) = match_orphaned_param(bytes, i) {
            i = end;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    // SAFETY-equivalent: we only ever drop complete runs of ASCII bytes
    // from a valid UTF-8 string, which cannot produce invalid UTF-8.
    String::from_utf8(out).unwrap_or_default()
}

fn match_orphaned_param(bytes: &[u8], start: usize) -> Option<usize> {
    const FINAL_BYTES: &[u8] = b"ABCDEFGHJKSTfmsu";

    let mut j = start;
    while j < bytes.len() && bytes[j].is_ascii_digit() {
        j += 1;
    }
    if j >= bytes.len() || bytes[j] != b';' {
        return None;
    }
    let mut k = j + 1;
    while k < bytes.len() && bytes[k].is_ascii_digit() {
        k += 1;
    }
    if k >= bytes.len() || !FINAL_BYTES.contains(&bytes[k]) {
        return None;
    }

    Some(k + 1)
}

/// Drop the batch if it carries too little signal: fewer than ten
/// characters, or an alphanumeric ratio below 30% (almost certainly
/// redraw noise).
pub fn passes_quality_gate(cleaned: &str) -> bool {
    let trimmed = cleaned.trim();
    if trimmed.len() < 10 {
        return false;
    }
    let alnum = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    alnum as f64 / trimmed.chars().count().max(1) as f64 >= 0.3
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
