// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow controller & injector: tracks agent idleness from output silence
//! plus prompt-tail detection, queues inbound messages by priority, and
//! formats/delivers them through the best available channel.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::io::unix::AsyncFd;

use crate::pty::nbio::{write_all, PtyFd};

const MAX_QUEUE: usize = 50;
const STALENESS: Duration = Duration::from_secs(5 * 60);
const TAIL_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSignal {
    YourTurn,
    TurnWait,
}

/// Compact heartbeat/orchestration context carried on some inbound
/// messages, surfaced only to orchestrator-class agents.
#[derive(Debug, Clone)]
pub struct OrchestrationContext {
    pub mode: String,
    pub round: u32,
    pub max_rounds: u32,
    pub current_turn: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Injection {
    pub sender: String,
    pub content: String,
    pub received_at: Instant,
    pub priority: Priority,
    pub turn_signal: Option<TurnSignal>,
    pub context: Option<OrchestrationContext>,
}

/// Per-agent idleness thresholds, selected by case-insensitive substring
/// match on the agent name.
#[derive(Debug, Clone, Copy)]
pub struct FlowTuning {
    pub min_silence: Duration,
    pub long_silence: Duration,
}

const DEFAULT_TUNING: FlowTuning =
    FlowTuning { min_silence: Duration::from_millis(300), long_silence: Duration::from_secs(2) };

const AGENT_TUNINGS: &[(&str, FlowTuning)] = &[
    (
        "claude",
        FlowTuning { min_silence: Duration::from_millis(500), long_silence: Duration::from_secs(3) },
    ),
    (
        "codex",
        FlowTuning { min_silence: Duration::from_millis(200), long_silence: Duration::from_secs(2) },
    ),
];

fn tuning_for(agent_name: &str) -> FlowTuning {
    let lower = agent_name.to_lowercase();
    AGENT_TUNINGS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, tuning)| *tuning)
        .unwrap_or(DEFAULT_TUNING)
}

pub struct FlowController {
    tuning: FlowTuning,
    last_output: Instant,
    tail: VecDeque<u8>,
    urgent: VecDeque<Injection>,
    normal: VecDeque<Injection>,
    prompt_patterns: Vec<Regex>,
}

impl FlowController {
    pub fn new(agent_name: &str) -> anyhow::Result<Self> {
        let prompt_patterns = vec![
            Regex::new(r".*[>$#]\s*$")?,
            Regex::new(r".*\?\s*$")?,
            Regex::new(r".*:\s*$")?,
            Regex::new(r".*\[y/n\]\s*$")?,
            Regex::new(r"Press.*to continue.*$")?,
        ];
        Ok(Self {
            tuning: tuning_for(agent_name),
            last_output: Instant::now(),
            tail: VecDeque::with_capacity(TAIL_CAPACITY),
            urgent: VecDeque::new(),
            normal: VecDeque::new(),
            prompt_patterns,
        })
    }

    /// Called whenever output arrives from the agent.
    pub fn on_output(&mut self, data: &[u8]) {
        self.last_output = Instant::now();
        for &b in data {
            if self.tail.len() == TAIL_CAPACITY {
                self.tail.pop_front();
            }
            self.tail.push_back(b);
        }
    }

    /// Time + tail heuristic deciding whether it is safe to inject.
    pub fn is_idle(&self) -> bool {
        let silence = self.last_output.elapsed();
        if silence < self.tuning.min_silence {
            return false;
        }
        if silence >= self.tuning.long_silence {
            return true;
        }
        let tail: Vec<u8> = self.tail.iter().copied().collect();
        let tail_str = String::from_utf8_lossy(&tail);
        self.prompt_patterns.iter().any(|p| p.is_match(&tail_str))
    }

    /// Queue an injection. On overflow, the oldest non-urgent entry is
    /// dropped; the caller is responsible for surfacing the returned
    /// warning, if any, to the operator.
    pub fn enqueue(&mut self, injection: Injection) -> Option<String> {
        let queue = match injection.priority {
            Priority::Urgent => &mut self.urgent,
            Priority::Normal => &mut self.normal,
        };

        let mut warning = None;
        if queue.len() >= MAX_QUEUE {
            if let Some(dropped) = queue.pop_front() {
                warning = Some(format!(
                    "[CSP: Queue overflow, dropped message from {}]",
                    dropped.sender
                ));
            }
        }
        queue.push_back(injection);
        warning
    }

    /// Pop the next ready injection, dropping any stale entries (older
    /// than 5 minutes) encountered along the way. Urgent strictly
    /// precedes normal.
    pub fn pop_ready(&mut self) -> Option<Injection> {
        for queue in [&mut self.urgent, &mut self.normal] {
            while let Some(front) = queue.front() {
                if front.received_at.elapsed() >= STALENESS {
                    queue.pop_front();
                } else {
                    break;
                }
            }
        }
        self.urgent.pop_front().or_else(|| self.normal.pop_front())
    }

    pub fn queue_len(&self) -> usize {
        self.urgent.len() + self.normal.len()
    }

    /// Whether the front of the queue should be delivered right now: an
    /// urgent message bypasses idleness entirely; a normal one waits for
    /// idleness or for the injection timeout to elapse.
    pub fn should_inject_now(&self, idle: bool, injection_timeout: Duration) -> bool {
        if !self.urgent.is_empty() {
            return true;
        }
        match self.normal.front() {
            Some(front) => idle || front.received_at.elapsed() >= injection_timeout,
            None => false,
        }
    }
}

/// Format an injection per §4.3: a turn-signal banner, then
/// `[From <sender>]: <content>`, with an optional orchestrator context
/// prefix.
pub fn format_injection(injection: &Injection, is_orchestrator: bool) -> String {
    let mut message = String::new();
    if injection.turn_signal == Some(TurnSignal::YourTurn) {
        message.push_str("[YOUR TURN] ");
    }
    message.push_str(&format!("[From {}]: ", injection.sender));
    if is_orchestrator {
        if let Some(ctx) = &injection.context {
            message.push_str(&format!(
                "[STATE: {} R{}/{} Turn={} {}s] ",
                ctx.mode,
                ctx.round + 1,
                ctx.max_rounds,
                ctx.current_turn,
                ctx.elapsed_ms / 1000
            ));
        }
    }
    message.push_str(&injection.content);
    message
}

/// Where formatted injections are written: a terminal multiplexer's
/// literal send-keys primitive (preferred — many TUI agents ignore writes
/// made directly to the PTY master), or a direct master write.
#[derive(Debug, Clone)]
pub enum InjectionChannel {
    Tmux { pane: String },
    PtyMaster,
}

/// Detect the injection channel at startup, from the environment.
pub async fn detect_injection_channel() -> InjectionChannel {
    if let Ok(pane) = std::env::var("TMUX_PANE") {
        if !pane.is_empty() && tmux_available().await {
            return InjectionChannel::Tmux { pane };
        }
    }
    InjectionChannel::PtyMaster
}

async fn tmux_available() -> bool {
    tokio::process::Command::new("tmux")
        .arg("-V")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Write a formatted message through the selected injection channel.
pub async fn write_injection(
    channel: &InjectionChannel,
    master: &AsyncFd<PtyFd>,
    message: &str,
) -> anyhow::Result<()> {
    match channel {
        InjectionChannel::Tmux { pane } => {
            if send_tmux_keys(pane, message).await.is_ok() {
                return Ok(());
            }
            // Fall back to the master write if tmux send-keys failed.
            write_via_master(master, message).await
        }
        InjectionChannel::PtyMaster => write_via_master(master, message).await,
    }
}

async fn send_tmux_keys(pane: &str, message: &str) -> anyhow::Result<()> {
    let literal = tokio::process::Command::new("tmux")
        .args(["send-keys", "-t", pane, "-l", message])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    anyhow::ensure!(literal.success(), "tmux send-keys (literal) failed");

    tokio::time::sleep(Duration::from_millis(50)).await;

    let enter = tokio::process::Command::new("tmux")
        .args(["send-keys", "-t", pane, "Enter"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    anyhow::ensure!(enter.success(), "tmux send-keys (Enter) failed");
    Ok(())
}

async fn write_via_master(master: &AsyncFd<PtyFd>, message: &str) -> anyhow::Result<()> {
    write_all(master, b"\x15").await?; // Ctrl+U: clear the line
    tokio::time::sleep(Duration::from_millis(20)).await;
    write_all(master, message.as_bytes()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    write_all(master, b"\r").await?;
    Ok(())
}

/// `/pause`, `/resume`, `csp_ctrl:pause|resume`, `/share`, `/noshare` are
/// applied as control effects rather than injected verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEffect {
    Pause,
    Resume,
    ShareOn,
    ShareOff,
}

pub fn classify_control(content: &str) -> Option<ControlEffect> {
    let lower = content.trim().to_lowercase();
    if lower == "/share" {
        return Some(ControlEffect::ShareOn);
    }
    if lower == "/noshare" {
        return Some(ControlEffect::ShareOff);
    }
    if lower.starts_with("csp_ctrl:pause") || lower == "/pause" {
        return Some(ControlEffect::Pause);
    }
    if lower.starts_with("csp_ctrl:resume") || lower == "/resume" {
        return Some(ControlEffect::Resume);
    }
    None
}

/// Backlog accumulated while paused; drained in arrival order on resume.
#[derive(Default)]
pub struct PauseState {
    pub paused: bool,
    pub backlog: VecDeque<Injection>,
}

impl PauseState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
