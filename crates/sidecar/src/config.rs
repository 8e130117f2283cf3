// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// PTY-proxying sidecar that bridges an interactive CLI agent to a chat gateway.
#[derive(Debug, Parser)]
#[command(name = "sidecar", version, about)]
pub struct Config {
    /// Human-readable agent name. Normalized (lowercased, spaces to dashes)
    /// before registration.
    #[arg(long, env = "CSP_NAME")]
    pub name: String,

    /// Base URL of the gateway.
    #[arg(long, env = "CSP_GATEWAY_URL", default_value = "http://localhost:8765")]
    pub gateway_url: String,

    /// Gateway auth token. Without one, registration is skipped and the
    /// sidecar runs standalone (local terminal pass-through only).
    #[arg(long, env = "CSP_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Text injected into the agent's stdin shortly after startup.
    #[arg(long, env = "CSP_INITIAL_PROMPT")]
    pub initial_prompt: Option<String>,

    /// Seconds to wait for idleness before injecting a queued message anyway.
    #[arg(long, env = "CSP_INJECTION_TIMEOUT", default_value_t = 0.5)]
    pub injection_timeout: f64,

    /// Log format (json or text).
    #[arg(long, env = "CSP_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CSP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to run under the PTY (the supervised agent and its argv).
    #[arg(long = "cmd", required = true, num_args = 1.., allow_hyphen_values = true)]
    pub cmd: Vec<String>,
}

impl Config {
    /// Validate the configuration after parsing. Non-zero exit on failure.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cmd.is_empty() {
            anyhow::bail!("--cmd must name a command to run");
        }
        if self.normalized_name().is_empty() {
            anyhow::bail!("--name must not be empty");
        }
        if self.injection_timeout < 0.0 {
            anyhow::bail!("--injection-timeout must not be negative");
        }
        Ok(())
    }

    /// Normalize the configured agent name into the id requested at
    /// registration: lowercased, spaces replaced with dashes.
    pub fn normalized_name(&self) -> String {
        self.name.trim().to_lowercase().replace(' ', "-")
    }

    pub fn injection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.injection_timeout.max(0.0))
    }
}
