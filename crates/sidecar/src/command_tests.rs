#![allow(clippy::unwrap_used, clippy::expect_used)]
use super::*;
use crate::gateway::Client;

fn processor() -> CommandProcessor {
    CommandProcessor::new().expect("regexes compile")
}

#[test]
fn detects_send_agent_directive() {
    let p = processor();
    let commands = p.detect("before\n@send.claude hello there\nafter");
    assert_eq!(
        commands,
        vec![Command::SendAgent { target: "claude".to_owned(), message: "hello there".to_owned() }]
    );
}

#[test]
fn detects_broadcast_directive() {
    let p = processor();
    let commands = p.detect("@all status update");
    assert_eq!(commands, vec![Command::SendAll { message: "status update".to_owned() }]);
}

#[test]
fn detects_mode_set_with_explicit_rounds() {
    let p = processor();
    let commands = p.detect(r#"@mode.set debate "is rust memory safe" --rounds 5"#);
    assert_eq!(
        commands,
        vec![Command::ModeSet { mode: "debate".to_owned(), topic: "is rust memory safe".to_owned(), rounds: 5 }]
    );
}

#[test]
fn detects_mode_set_default_rounds() {
    let p = processor();
    let commands = p.detect(r#"@mode.set freeform "chat""#);
    assert_eq!(
        commands,
        vec![Command::ModeSet { mode: "freeform".to_owned(), topic: "chat".to_owned(), rounds: 3 }]
    );
}

#[test]
fn detects_mode_status_noop_and_working() {
    let p = processor();
    assert_eq!(p.detect("@mode.status"), vec![Command::ModeStatus]);
    assert_eq!(p.detect("NOOP"), vec![Command::Noop]);
    assert_eq!(
        p.detect("@working compiling the crate"),
        vec![Command::Working { note: "compiling the crate".to_owned() }]
    );
    assert_eq!(p.detect("WORKING"), vec![Command::Working { note: String::new() }]);
}

#[test]
fn first_match_wins_precedence() {
    let p = processor();
    // A line matching both @send and @all patterns should only ever hit @send
    // because it is the literal text being matched, not an ambiguous case —
    // this instead checks that an unrelated line with no directive yields none.
    assert!(p.detect("just chatting, nothing special here").is_empty());
}

#[test]
fn send_agent_command_reports_success_envelope() {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    rt.block_on(async {
        let client = Client::new("http://127.0.0.1:1".to_owned(), None);
        let p = processor();
        let command = Command::SendAgent { target: "claude".to_owned(), message: "hello".to_owned() };
        let reply = p.execute(&command, &client, "codex").await;
        // Unreachable gateway still produces a well-formed CSP envelope,
        // matching the "never block the PTY loop on gateway errors" invariant.
        assert!(reply.starts_with("[CSP:"));
    });
}
