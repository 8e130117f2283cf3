#![allow(clippy::unwrap_used, clippy::expect_used)]
use super::*;

#[test]
fn chunked_escape_sequence_is_coalesced() {
    let mut s = Sanitizer::new();
    let mut out = String::new();
    out += &s.process(b"A\x1b[31");
    out += &s.process(b"mhi\x1b[0m");
    out += &s.process(b"B");
    assert_eq!(out, "AhiB");
}

#[test]
fn unterminated_escape_drops_bytes_not_escape_char() {
    let mut s = Sanitizer::new();
    let out = s.process(b"before\x1b[31");
    assert!(!out.contains('\x1b'));
    assert_eq!(out, "before");
}

#[test]
fn stage_one_is_idempotent_on_plain_text() {
    let mut s = Sanitizer::new();
    let out = s.process(b"plain text, no escapes here");
    assert_eq!(out, "plain text, no escapes here");
}

#[test]
fn stage_two_strips_osc_and_collapses_whitespace() {
    let cleaner = Stage2Cleaner::new().expect("regex compiles");
    let input = "hello\x1b]0;title\x07   world\n\n\n\nend";
    let cleaned = cleaner.clean(input);
    assert_eq!(cleaned, "hello world\n\nend");
}

#[test]
fn stage_two_leaves_legitimate_digit_letter_text_alone() {
    let cleaner = Stage2Cleaner::new().expect("regex compiles");
    assert_eq!(cleaner.clean("set speed to 3m please"), "set speed to 3m please");
    assert_eq!(cleaner.clean("transferred 10K today"), "transferred 10K today");
}

#[test]
fn stage_two_strips_orphaned_csi_params_with_semicolon() {
    let cleaner = Stage2Cleaner::new().expect("regex compiles");
    assert_eq!(cleaner.clean("abc31;2Hdef"), "abcdef");
    assert_eq!(cleaner.clean("x;0my"), "xy");
}

#[test]
fn stage_two_is_idempotent() {
    let cleaner = Stage2Cleaner::new().expect("regex compiles");
    let input = "hi\x1b[31mcolor\x1b[0m ?25h done";
    let once = cleaner.clean(input);
    let twice = cleaner.clean(&once);
    assert_eq!(once, twice);
}

#[test]
fn quality_gate_rejects_short_and_noisy_text() {
    assert!(!passes_quality_gate("hi"));
    assert!(!passes_quality_gate(";;;;;;;;;;;;;;"));
    assert!(passes_quality_gate("this is a normal sentence of output"));
}
