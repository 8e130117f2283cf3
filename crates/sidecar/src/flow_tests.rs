#![allow(clippy::unwrap_used, clippy::expect_used)]
use super::*;
use std::thread::sleep;

fn injection(sender: &str, content: &str, priority: Priority) -> Injection {
    Injection {
        sender: sender.to_owned(),
        content: content.to_owned(),
        received_at: Instant::now(),
        priority,
        turn_signal: None,
        context: None,
    }
}

#[test]
fn prompt_tail_idleness_matches_spec_scenario() {
    let mut flow = FlowController::new("generic-agent").expect("regexes compile");
    flow.on_output(b"> ");
    sleep(Duration::from_millis(350));
    assert!(flow.is_idle());

    let mut flow2 = FlowController::new("generic-agent").expect("regexes compile");
    flow2.on_output(b"working");
    sleep(Duration::from_millis(350));
    assert!(!flow2.is_idle());
}

#[test]
fn below_min_silence_is_never_idle() {
    let mut flow = FlowController::new("generic-agent").expect("regexes compile");
    flow.on_output(b"> ");
    assert!(!flow.is_idle());
}

#[test]
fn long_silence_is_idle_regardless_of_tail() {
    let mut flow = FlowController::new("codex-worker").expect("regexes compile");
    flow.on_output(b"still rendering a spinner frame");
    sleep(Duration::from_millis(2100));
    assert!(flow.is_idle());
}

#[test]
fn per_agent_tuning_selected_by_substring() {
    let claude = FlowController::new("Claude Opus").expect("regexes compile");
    assert_eq!(claude.tuning.min_silence, Duration::from_millis(500));
    let codex = FlowController::new("codex-cli").expect("regexes compile");
    assert_eq!(codex.tuning.min_silence, Duration::from_millis(200));
    let other = FlowController::new("mystery-agent").expect("regexes compile");
    assert_eq!(other.tuning.min_silence, Duration::from_millis(300));
}

#[test]
fn urgent_strictly_precedes_normal() {
    let mut flow = FlowController::new("agent").expect("regexes compile");
    flow.enqueue(injection("a", "normal one", Priority::Normal));
    flow.enqueue(injection("b", "urgent one", Priority::Urgent));
    let popped = flow.pop_ready().expect("one ready");
    assert_eq!(popped.sender, "b");
}

#[test]
fn queue_overflow_drops_oldest_non_urgent() {
    let mut flow = FlowController::new("agent").expect("regexes compile");
    for i in 0..MAX_QUEUE {
        flow.enqueue(injection(&format!("s{i}"), "msg", Priority::Normal));
    }
    let warning = flow.enqueue(injection("newest", "msg", Priority::Normal));
    assert!(warning.is_some());
    assert!(warning.unwrap().contains("s0"));
}

#[test]
fn stale_messages_are_dropped_on_pop() {
    let mut flow = FlowController::new("agent").expect("regexes compile");
    let mut stale = injection("old", "ancient", Priority::Normal);
    stale.received_at = Instant::now() - Duration::from_secs(301);
    flow.normal.push_back(stale);
    flow.enqueue(injection("fresh", "recent", Priority::Normal));
    let popped = flow.pop_ready().expect("fresh message remains");
    assert_eq!(popped.sender, "fresh");
}

#[test]
fn turn_signal_formatting() {
    let mut inj = injection("o", "go", Priority::Normal);
    inj.turn_signal = Some(TurnSignal::YourTurn);
    let formatted = format_injection(&inj, false);
    assert_eq!(formatted, "[YOUR TURN] [From o]: go");
}

#[test]
fn plain_message_formatting() {
    let inj = injection("o", "go", Priority::Normal);
    let formatted = format_injection(&inj, false);
    assert_eq!(formatted, "[From o]: go");
}

#[test]
fn orchestrator_context_prefix() {
    let mut inj = injection("o", "go", Priority::Normal);
    inj.context = Some(OrchestrationContext {
        mode: "debate".to_owned(),
        round: 1,
        max_rounds: 3,
        current_turn: "myagent".to_owned(),
        elapsed_ms: 4200,
    });
    let formatted = format_injection(&inj, true);
    assert_eq!(formatted, "[From o]: [STATE: debate R2/3 Turn=myagent 4s] go");
}

#[test]
fn should_inject_now_respects_timeout_and_urgency() {
    let mut flow = FlowController::new("agent").expect("regexes compile");
    flow.enqueue(injection("a", "wait for idle", Priority::Normal));
    assert!(!flow.should_inject_now(false, Duration::from_millis(500)));
    assert!(flow.should_inject_now(true, Duration::from_millis(500)));

    let mut urgent_flow = FlowController::new("agent").expect("regexes compile");
    urgent_flow.enqueue(injection("b", "now", Priority::Urgent));
    assert!(urgent_flow.should_inject_now(false, Duration::from_secs(999)));
}

#[test]
fn classify_control_directives() {
    assert_eq!(classify_control("/pause"), Some(ControlEffect::Pause));
    assert_eq!(classify_control("/resume"), Some(ControlEffect::Resume));
    assert_eq!(classify_control("csp_ctrl:pause"), Some(ControlEffect::Pause));
    assert_eq!(classify_control("csp_ctrl:resume now"), Some(ControlEffect::Resume));
    assert_eq!(classify_control("/share"), Some(ControlEffect::ShareOn));
    assert_eq!(classify_control("/noshare"), Some(ControlEffect::ShareOff));
    assert_eq!(classify_control("hello"), None);
}
