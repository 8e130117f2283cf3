// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent push connection with capped exponential backoff, falling
//! back to inbox polling after too many consecutive failures.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::client::{Client, InboundMessage};
use crate::error::ErrorKind;

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RETRY_PUSH_EVERY: Duration = Duration::from_secs(5);

/// Pure reconnect bookkeeping: attempt counter and current backoff delay.
/// Kept separate from the I/O so backoff monotonicity is unit-testable.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectState {
    attempts: u32,
    backoff: Duration,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self { attempts: 0, backoff: Duration::from_secs(1) }
    }

    pub fn should_fall_back(&self) -> bool {
        self.attempts >= MAX_RECONNECT_ATTEMPTS
    }

    /// Record a failed connect attempt, returning the delay to sleep
    /// before the next try.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.backoff;
        self.attempts += 1;
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
        delay
    }

    pub fn record_success(&mut self) {
        self.attempts = 0;
        self.backoff = Duration::from_secs(1);
    }
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new()
    }
}

fn build_ws_url(base_url: &str, auth_token: Option<&str>) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{base_url}")
    };
    match auth_token {
        Some(token) => format!("{ws_base}/ws?token={token}"),
        None => format!("{ws_base}/ws"),
    }
}

/// Drive the gateway inbound channel for the lifetime of the sidecar:
/// alternate between the push connection (preferred) and HTTP polling,
/// delivering every message addressed to this agent or a broadcast.
pub async fn run_listener(
    client: Arc<Client>,
    agent_id: String,
    shutdown: CancellationToken,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
) {
    let mut reconnect = ReconnectState::new();

    while !shutdown.is_cancelled() {
        if !reconnect.should_fall_back() {
            let ws_url = build_ws_url(client.base_url(), client.auth_token());
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                result = tokio_tungstenite::connect_async(&ws_url) => match result {
                    Ok((stream, _)) => {
                        reconnect.record_success();
                        tracing::info!(agent_id = %agent_id, "gateway push connection established");
                        listen_push(stream, &agent_id, &shutdown, &inbound_tx).await;
                    }
                    Err(e) => {
                        let delay = reconnect.record_failure();
                        tracing::debug!(kind = %ErrorKind::Gateway, error = %e, "gateway push connect failed, backing off");
                        tokio::select! {
                            _ = shutdown.cancelled() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
            }
        } else {
            poll_fallback(&client, &agent_id, &shutdown, &inbound_tx, &mut reconnect).await;
        }
    }
}

async fn listen_push(
    stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    agent_id: &str,
    shutdown: &CancellationToken,
    inbound_tx: &mpsc::UnboundedSender<InboundMessage>,
) {
    let (_write, mut read) = stream.split();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundMessage>(&text) {
                            Ok(parsed) => deliver_if_addressed(parsed, agent_id, inbound_tx),
                            Err(e) => tracing::debug!(kind = %ErrorKind::Gateway, error = %e, "invalid gateway push message"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(agent_id, "gateway push connection closed");
                        return;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(kind = %ErrorKind::Gateway, error = %e, "gateway push connection error");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

fn deliver_if_addressed(
    msg: InboundMessage,
    agent_id: &str,
    inbound_tx: &mpsc::UnboundedSender<InboundMessage>,
) {
    let addressed = match msg.to.as_deref() {
        Some("broadcast") | None => true,
        Some(to) => to == agent_id,
    };
    if addressed {
        let _ = inbound_tx.send(msg);
    }
}

async fn poll_fallback(
    client: &Client,
    agent_id: &str,
    shutdown: &CancellationToken,
    inbound_tx: &mpsc::UnboundedSender<InboundMessage>,
    reconnect: &mut ReconnectState,
) {
    tracing::info!(agent_id, "using gateway HTTP polling fallback");
    let mut since_retry = Duration::ZERO;

    while !shutdown.is_cancelled() {
        match client.poll_inbox(agent_id).await {
            Ok(messages) => {
                for msg in messages {
                    deliver_if_addressed(msg, agent_id, inbound_tx);
                }
            }
            Err(e) => tracing::debug!(kind = %ErrorKind::Gateway, error = %e, "gateway inbox poll failed"),
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
        since_retry += POLL_INTERVAL;

        if since_retry >= RETRY_PUSH_EVERY {
            reconnect.record_success();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_five_consecutive_failures() {
        let mut state = ReconnectState::new();
        let mut delays = Vec::new();
        while !state.should_fall_back() {
            delays.push(state.record_failure());
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
            ]
        );
        assert!(state.should_fall_back());
    }

    #[test]
    fn success_resets_backoff() {
        let mut state = ReconnectState::new();
        state.record_failure();
        state.record_failure();
        state.record_success();
        assert!(!state.should_fall_back());
        assert_eq!(state.record_failure(), Duration::from_secs(1));
    }
}
