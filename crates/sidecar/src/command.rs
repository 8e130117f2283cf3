// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scans cleaned agent output for in-band directives and turns them into
//! gateway HTTP calls, formatting a `[CSP: …]` reply for each.

use regex::Regex;

use crate::gateway::Client;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    QueryLog { limit: u32, from: Option<String>, to: Option<String> },
    SendAgent { target: String, message: String },
    SendAll { message: String },
    ModeSet { mode: String, topic: String, rounds: u32 },
    ModeStatus,
    Noop,
    Working { note: String },
}

pub struct CommandProcessor {
    query_log: Regex,
    send_agent: Regex,
    send_all: Regex,
    mode_set: Regex,
    mode_status: Regex,
    noop: Regex,
    working_at: Regex,
    working_bare: Regex,
}

impl CommandProcessor {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            query_log: Regex::new(
                r"@query\.log(?:\s+(\d+))?(?:\s+from=(\S+))?(?:\s+to=(\S+))?",
            )?,
            send_agent: Regex::new(r"@send\.([\w-]+)\s+(.+)")?,
            send_all: Regex::new(r"@all\s+(.+)")?,
            mode_set: Regex::new(r#"@mode\.set\s+(\w+)\s+"([^"]+)"(?:\s+--rounds\s+(\d+))?"#)?,
            mode_status: Regex::new(r"@mode\.status")?,
            noop: Regex::new(r"(?i)^NOOP\s*$")?,
            working_at: Regex::new(r"(?i)^\s*@working\b(.*)$")?,
            working_bare: Regex::new(r"^\s*WORKING\b(.*)$")?,
        })
    }

    /// Detect at most one directive per line, first pattern wins, in the
    /// precedence order shown here.
    pub fn detect(&self, text: &str) -> Vec<Command> {
        let mut commands = Vec::new();
        for line in text.split('\n') {
            if let Some(m) = self.query_log.captures(line) {
                let limit = m.get(1).and_then(|g| g.as_str().parse().ok()).unwrap_or(50);
                let from = m.get(2).map(|g| g.as_str().to_owned());
                let to = m.get(3).map(|g| g.as_str().to_owned());
                commands.push(Command::QueryLog { limit, from, to });
                continue;
            }
            if let Some(m) = self.send_agent.captures(line) {
                let target = m[1].to_owned();
                let message = m[2].trim().to_owned();
                commands.push(Command::SendAgent { target, message });
                continue;
            }
            if let Some(m) = self.send_all.captures(line) {
                commands.push(Command::SendAll { message: m[1].trim().to_owned() });
                continue;
            }
            if let Some(m) = self.mode_set.captures(line) {
                let mode = m[1].to_owned();
                let topic = m[2].to_owned();
                let rounds = m.get(3).and_then(|g| g.as_str().parse().ok()).unwrap_or(3);
                commands.push(Command::ModeSet { mode, topic, rounds });
                continue;
            }
            if self.mode_status.is_match(line) {
                commands.push(Command::ModeStatus);
                continue;
            }
            if self.noop.is_match(line) {
                commands.push(Command::Noop);
                continue;
            }
            let working_match = self.working_at.captures(line).or_else(|| self.working_bare.captures(line));
            if let Some(m) = working_match {
                commands.push(Command::Working { note: m[1].trim().to_owned() });
                continue;
            }
        }
        commands
    }

    /// Execute a detected command against the gateway, returning the
    /// `[CSP: …]` envelope to enqueue back toward the agent.
    pub async fn execute(&self, command: &Command, client: &Client, self_id: &str) -> String {
        match command {
            Command::QueryLog { limit, from, to } => {
                match client.history(*limit, from.as_deref(), to.as_deref()).await {
                    Ok(messages) if messages.is_empty() => "[CSP: No messages in history]".to_owned(),
                    Ok(messages) => {
                        let mut out = String::from("[CSP: Recent messages]");
                        for msg in messages {
                            let content: String = msg.content.chars().take(100).collect();
                            out.push_str(&format!("\n[{}] {}: {}", msg.timestamp, msg.from, content));
                        }
                        out
                    }
                    Err(e) => format!("[CSP: History query error - {e}]"),
                }
            }
            Command::SendAgent { target, message } => {
                match client.send_message(self_id, target, message).await {
                    Ok(()) => format!("[CSP: Message sent to {target}]"),
                    Err(e) => format!("[CSP: Send error - {e}]"),
                }
            }
            Command::SendAll { message } => {
                match client.send_message(self_id, "broadcast", message).await {
                    Ok(()) => "[CSP: Message broadcast to all agents]".to_owned(),
                    Err(e) => format!("[CSP: Broadcast error - {e}]"),
                }
            }
            Command::ModeSet { mode, topic, rounds } => {
                let agent_ids = match client.agents().await {
                    Ok(agents) => agents
                        .into_iter()
                        .filter(|id| id != "Human" && id != self_id)
                        .collect(),
                    Err(_) => Vec::new(),
                };
                match client.set_mode(mode, topic, *rounds, agent_ids).await {
                    Ok(()) => format!("[CSP: Mode set to {} - Topic: {topic}]", mode.to_uppercase()),
                    Err(e) => format!("[CSP: Mode set error - {e}]"),
                }
            }
            Command::ModeStatus => match client.mode_status().await {
                Ok(status) if status.mode == "freeform" => {
                    "[CSP: Mode=FREEFORM (no structured collaboration active)]".to_owned()
                }
                Ok(status) => format!(
                    "[CSP: Mode={}, Topic={}, Round={}/{}, CurrentTurn={}]",
                    status.mode.to_uppercase(),
                    status.topic,
                    status.round + 1,
                    status.max_rounds,
                    status.current_turn.as_deref().unwrap_or("N/A"),
                ),
                Err(e) => format!("[CSP: Status query error - {e}]"),
            },
            Command::Noop => "[CSP: NOOP acknowledged]".to_owned(),
            Command::Working { note } => {
                let content = if note.is_empty() { "WORKING".to_owned() } else { format!("WORKING {note}") };
                match client.send_message(self_id, "broadcast", &content).await {
                    Ok(()) => "[CSP: Working acknowledged]".to_owned(),
                    Err(e) => format!("[CSP: Working signal error - {e}]"),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
