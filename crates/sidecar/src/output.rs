// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output batching: accumulates cleaned text and decides when to flush it
//! toward the gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ErrorKind;
use crate::sanitize::{passes_quality_gate, Stage2Cleaner};

const FLUSH_INTERVAL: Duration = Duration::from_millis(200);
const SOFT_THRESHOLD: usize = 512;
const HARD_MAXIMUM: usize = 8192;

/// Cleaned text accumulated since the last flush, plus the batching policy
/// (size/time/boundary triggers) and the quality gate applied before send.
pub struct OutputBuffer {
    buffer: String,
    last_flush: Instant,
    cleaner: Stage2Cleaner,
    /// Gateway output sharing. Off by default; toggled by `/share`/`/noshare`
    /// control directives relayed through the flow controller.
    share_enabled: Arc<AtomicBool>,
}

impl OutputBuffer {
    pub fn new(share_enabled: Arc<AtomicBool>) -> anyhow::Result<Self> {
        Ok(Self {
            buffer: String::new(),
            last_flush: Instant::now(),
            cleaner: Stage2Cleaner::new()?,
            share_enabled,
        })
    }

    /// Append a stage-one-cleaned chunk. Returns whether a semantic
    /// boundary (newline or ". ") was just seen, for the caller to pass
    /// into `maybe_flush`.
    pub fn push(&mut self, clean_chunk: &str) -> bool {
        self.buffer.push_str(clean_chunk);
        if self.buffer.len() > HARD_MAXIMUM {
            // Invariant: never exceeds the hard maximum between reads.
            let overflow = self.buffer.len() - HARD_MAXIMUM;
            self.buffer.drain(..overflow);
        }
        clean_chunk.contains('\n') || clean_chunk.contains(". ")
    }

    /// Decide whether to flush now, given whether a boundary was just
    /// observed. Returns the stage-two-cleaned, quality-gated text to push
    /// to the gateway, or `None` if nothing should be sent (buffer empty,
    /// sharing disabled, or the batch failed the quality gate).
    pub fn maybe_flush(&mut self, boundary: bool) -> Option<String> {
        if self.should_flush(boundary) {
            self.flush()
        } else {
            None
        }
    }

    /// Force a flush regardless of policy (used on shutdown).
    pub fn force_flush(&mut self) -> Option<String> {
        self.flush()
    }

    fn should_flush(&self, boundary: bool) -> bool {
        self.buffer.len() >= HARD_MAXIMUM
            || boundary
            || self.buffer.len() >= SOFT_THRESHOLD
            || self.last_flush.elapsed() >= FLUSH_INTERVAL
    }

    fn flush(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        self.last_flush = Instant::now();

        if !self.share_enabled.load(Ordering::Relaxed) || raw.is_empty() {
            return None;
        }

        let cleaned = self.cleaner.clean(&raw);
        if !passes_quality_gate(&cleaned) {
            tracing::trace!(kind = %ErrorKind::Sanitizer, "dropped low-signal output batch at the quality gate");
            return None;
        }
        Some(cleaned)
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
