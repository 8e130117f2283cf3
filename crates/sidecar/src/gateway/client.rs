// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the gateway service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A message delivered to this agent, either over the push connection or
/// via inbox polling.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub content: String,
    #[serde(rename = "turnSignal", default)]
    pub turn_signal: Option<String>,
    #[serde(rename = "currentTurn", default)]
    pub current_turn: Option<String>,
    #[serde(default)]
    pub context: Option<ContextWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextWire {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub round: u32,
    #[serde(rename = "maxRounds", default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(rename = "currentTurn", default = "default_na")]
    pub current_turn: String,
    #[serde(default)]
    pub elapsed: u64,
}

fn default_mode() -> String {
    "freeform".to_owned()
}
fn default_max_rounds() -> u32 {
    3
}
fn default_na() -> String {
    "N/A".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub timestamp: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModeStatus {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub round: u32,
    #[serde(rename = "maxRounds", default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(rename = "turnOrder", default)]
    pub turn_order: Vec<String>,
    #[serde(rename = "currentTurnIndex", default)]
    pub current_turn_index: usize,
}

impl ModeStatus {
    pub fn current_turn(&self) -> Option<&str> {
        self.turn_order.get(self.current_turn_index).map(String::as_str)
    }
}

/// Convenience accessor used by the command processor, matching the
/// Python original's `current_turn` fallback to `'N/A'`.
pub struct ResolvedModeStatus {
    pub mode: String,
    pub topic: String,
    pub round: u32,
    pub max_rounds: u32,
    pub current_turn: Option<String>,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    #[serde(rename = "agentId")]
    agent_id: &'a str,
    capabilities: Capabilities,
}

#[derive(Serialize)]
struct Capabilities {
    chat: bool,
    respond: bool,
}

#[derive(Deserialize)]
struct RegisterResponse {
    #[serde(rename = "agentId")]
    agent_id: String,
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    from: &'a str,
    to: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OutputPayload<'a> {
    from: &'a str,
    to: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ModePayload<'a> {
    mode: &'a str,
    topic: &'a str,
    rounds: u32,
    agents: Vec<String>,
}

#[derive(Deserialize)]
struct AgentEntry {
    id: String,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

/// HTTP client wrapper for the gateway service consumed by this sidecar.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl Client {
    pub fn new(base_url: String, auth_token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, base_url, auth_token }
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.header("X-Auth-Token", token),
            None => req,
        }
    }

    /// POST `/register`. Returns the (possibly gateway-disambiguated)
    /// agent id the sidecar should adopt.
    pub async fn register(&self, requested_id: &str) -> anyhow::Result<String> {
        let body = RegisterRequest {
            agent_id: requested_id,
            capabilities: Capabilities { chat: true, respond: true },
        };
        let req = self.http.post(self.url("/register")).json(&body).timeout(Duration::from_secs(5));
        let resp = self.apply_auth(req).send().await?.error_for_status()?;
        let parsed: RegisterResponse = resp.json().await?;
        Ok(parsed.agent_id)
    }

    /// DELETE `/agent/<id>`, best-effort.
    pub async fn unregister(&self, agent_id: &str) -> anyhow::Result<()> {
        let req = self
            .http
            .delete(self.url(&format!("/agent/{agent_id}")))
            .timeout(Duration::from_secs(2));
        self.apply_auth(req).send().await?.error_for_status()?;
        Ok(())
    }

    /// POST `/agent-output`, best-effort with a short timeout — never
    /// blocks the PTY loop.
    pub async fn push_output(&self, from: &str, content: &str) -> anyhow::Result<()> {
        let body = OutputPayload { from, to: "broadcast", content };
        let req = self
            .http
            .post(self.url("/agent-output"))
            .json(&body)
            .timeout(Duration::from_millis(200));
        self.apply_auth(req).send().await?.error_for_status()?;
        Ok(())
    }

    /// GET `/inbox/<id>`.
    pub async fn poll_inbox(&self, agent_id: &str) -> anyhow::Result<Vec<InboundMessage>> {
        let req = self
            .http
            .get(self.url(&format!("/inbox/{agent_id}")))
            .timeout(Duration::from_secs(1));
        let resp = self.apply_auth(req).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    /// POST `/message`.
    pub async fn send_message(&self, from: &str, to: &str, content: &str) -> anyhow::Result<()> {
        let body = MessagePayload { from, to, content };
        let req = self.http.post(self.url("/message")).json(&body).timeout(Duration::from_secs(2));
        self.apply_auth(req).send().await?.error_for_status()?;
        Ok(())
    }

    /// GET `/history?limit=&from=&to=`.
    pub async fn history(
        &self,
        limit: u32,
        from: Option<&str>,
        to: Option<&str>,
    ) -> anyhow::Result<Vec<HistoryMessage>> {
        let mut req = self
            .http
            .get(self.url("/history"))
            .query(&[("limit", limit.to_string())])
            .timeout(Duration::from_secs(2));
        if let Some(from) = from {
            req = req.query(&[("from", from)]);
        }
        if let Some(to) = to {
            req = req.query(&[("to", to)]);
        }
        let resp = self.apply_auth(req).send().await?.error_for_status()?;
        let parsed: HistoryResponse = resp.json().await?;
        Ok(parsed.messages)
    }

    /// GET `/agents`.
    pub async fn agents(&self) -> anyhow::Result<Vec<String>> {
        let req = self.http.get(self.url("/agents")).timeout(Duration::from_secs(2));
        let resp = self.apply_auth(req).send().await?.error_for_status()?;
        let entries: Vec<AgentEntry> = resp.json().await?;
        Ok(entries.into_iter().map(|a| a.id).collect())
    }

    /// POST `/mode`.
    pub async fn set_mode(
        &self,
        mode: &str,
        topic: &str,
        rounds: u32,
        agents: Vec<String>,
    ) -> anyhow::Result<()> {
        let body = ModePayload { mode, topic, rounds, agents };
        let req = self.http.post(self.url("/mode")).json(&body).timeout(Duration::from_secs(2));
        self.apply_auth(req).send().await?.error_for_status()?;
        Ok(())
    }

    /// GET `/mode`.
    pub async fn mode_status(&self) -> anyhow::Result<ResolvedModeStatus> {
        let req = self.http.get(self.url("/mode")).timeout(Duration::from_secs(2));
        let resp = self.apply_auth(req).send().await?.error_for_status()?;
        let status: ModeStatus = resp.json().await?;
        Ok(ResolvedModeStatus {
            mode: status.mode.clone(),
            topic: status.topic.clone(),
            round: status.round,
            max_rounds: status.max_rounds,
            current_turn: status.current_turn().map(str::to_owned),
        })
    }
}
