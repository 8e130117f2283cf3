#![allow(clippy::unwrap_used, clippy::expect_used)]
use super::*;

fn buffer(share: bool) -> OutputBuffer {
    let flag = Arc::new(AtomicBool::new(share));
    OutputBuffer::new(flag).expect("regex compiles")
}

#[test]
fn never_exceeds_hard_maximum_between_flushes() {
    let mut buf = buffer(false);
    let chunk = "a".repeat(HARD_MAXIMUM + 500);
    buf.push(&chunk);
    assert!(buf.buffer.len() <= HARD_MAXIMUM);
}

#[test]
fn sharing_disabled_by_default_suppresses_output() {
    let mut buf = buffer(false);
    buf.push("a proper sentence of agent output.\n");
    assert_eq!(buf.maybe_flush(true), None);
}

#[test]
fn boundary_triggers_flush_when_sharing_enabled() {
    let mut buf = buffer(true);
    let boundary = buf.push("hello world, this is agent output\n");
    assert!(boundary);
    let flushed = buf.maybe_flush(boundary);
    assert_eq!(flushed.as_deref(), Some("hello world, this is agent output"));
}

#[test]
fn quality_gate_drops_short_batches() {
    let mut buf = buffer(true);
    let boundary = buf.push("hi\n");
    let flushed = buf.maybe_flush(boundary);
    assert_eq!(flushed, None);
}

#[test]
fn soft_threshold_triggers_flush_without_boundary() {
    let mut buf = buffer(true);
    let chunk = "x".repeat(SOFT_THRESHOLD + 10);
    buf.push(&chunk);
    let flushed = buf.maybe_flush(false);
    assert!(flushed.is_some());
}
