// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level session runner: wires the PTY, sanitizer, output pipeline,
//! flow controller, command processor, and gateway transport together and
//! drives the main select loop described for the PTY proxy core.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::CommandProcessor;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::flow::{
    classify_control, detect_injection_channel, format_injection, write_injection, ControlEffect,
    FlowController, Injection, OrchestrationContext, PauseState, Priority, TurnSignal,
};
use crate::gateway::client::InboundMessage;
use crate::gateway::{ws, Client};
use crate::output::OutputBuffer;
use crate::pty::{terminal_size, NativePty, RawModeGuard};
use crate::sanitize::Sanitizer;
use crate::state::SidecarState;

const MASTER_READ_SIZE: usize = 1024;
/// Upper bound on a single select iteration when nothing else wakes it,
/// matching the PTY loop's ~100 ms per-iteration contract.
const LOOP_TICK: Duration = Duration::from_millis(100);

pub async fn run(config: Config) -> anyhow::Result<i32> {
    config.validate()?;

    let requested_id = config.normalized_name();
    let client = Arc::new(Client::new(config.gateway_url.clone(), config.auth_token.clone()));

    let mut state = SidecarState::Starting;
    let agent_id = if config.auth_token.is_some() {
        match client.register(&requested_id).await {
            Ok(id) => {
                state = SidecarState::Registered;
                id
            }
            Err(e) => {
                tracing::warn!(kind = %ErrorKind::Gateway, error = %e, "gateway registration failed, running standalone");
                requested_id
            }
        }
    } else {
        tracing::info!("no auth token configured, running standalone");
        requested_id
    };
    let is_orchestrator = agent_id.to_lowercase().contains("orchestrator");

    let (cols, rows) = terminal_size(&std::io::stdout()).unwrap_or((80, 24));
    let mut pty = NativePty::spawn(&config.cmd, cols, rows)?;
    let raw_guard = RawModeGuard::enter()?;

    if let Some(prompt) = &config.initial_prompt {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut line = prompt.clone().into_bytes();
        line.push(b'\r');
        let _ = pty.write(&line).await;
    }

    let shutdown = CancellationToken::new();
    let share_enabled = Arc::new(AtomicBool::new(false));
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();

    let transport = {
        let client = Arc::clone(&client);
        let agent_id = agent_id.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            ws::run_listener(client, agent_id, shutdown, inbound_tx).await;
        })
    };

    let mut sanitizer = Sanitizer::new();
    let mut output = OutputBuffer::new(Arc::clone(&share_enabled))?;
    let mut flow = FlowController::new(&agent_id)?;
    let command_processor = CommandProcessor::new()?;
    let injection_channel = detect_injection_channel().await;
    let mut pause = PauseState::new();

    state = if state == SidecarState::Registered {
        advance(state, SidecarState::Running)
    } else {
        advance(SidecarState::Starting, SidecarState::Running)
    };

    let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(64);
    std::thread::spawn(move || {
        use std::io::Read;
        let stdin = std::io::stdin();
        let mut handle = stdin.lock();
        let mut buf = [0u8; 4096];
        loop {
            match handle.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if stdin_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut sigwinch = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change()).ok();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
    let mut tick = tokio::time::interval(LOOP_TICK);
    let mut stdout = std::io::stdout();
    let mut master_buf = vec![0u8; MASTER_READ_SIZE];

    let exit_code = 'outer: loop {
        if let Some(exit) = pty.try_reap() {
            tracing::info!(?exit, "supervised agent exited");
            break 'outer exit.code.unwrap_or(0);
        }

        tokio::select! {
            biased;

            _ = wait_signal(&mut sigterm) => {
                shutdown.cancel();
                break 'outer 0;
            }

            _ = wait_signal(&mut sigwinch) => {
                if let Some((cols, rows)) = terminal_size(&std::io::stdout()) {
                    if let Err(e) = pty.resize(cols, rows) {
                        tracing::debug!(kind = %ErrorKind::Terminal, error = %e, "window resize ioctl failed");
                    }
                }
            }

            result = pty.read(&mut master_buf) => {
                match result {
                    Ok(0) => break 'outer 0,
                    Ok(n) => {
                        let _ = stdout.write_all(&master_buf[..n]);
                        let _ = stdout.flush();

                        flow.on_output(&master_buf[..n]);
                        let clean_chunk = sanitizer.process(&master_buf[..n]);

                        for command in command_processor.detect(&clean_chunk) {
                            let reply = command_processor.execute(&command, &client, &agent_id).await;
                            flow.enqueue(Injection {
                                sender: "CSP".to_owned(),
                                content: reply,
                                received_at: Instant::now(),
                                priority: Priority::Normal,
                                turn_signal: None,
                                context: None,
                            });
                        }

                        let boundary = output.push(&clean_chunk);
                        if let Some(batch) = output.maybe_flush(boundary) {
                            let client = Arc::clone(&client);
                            let agent_id = agent_id.clone();
                            tokio::spawn(async move {
                                let _ = client.push_output(&agent_id, &batch).await;
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!(kind = %ErrorKind::Child, error = %e, "PTY master read failed");
                        break 'outer 1;
                    }
                }
            }

            data = stdin_rx.recv() => {
                if let Some(data) = data {
                    if pty.write(&data).await.is_err() {
                        break 'outer 1;
                    }
                }
            }

            msg = inbound_rx.recv() => {
                if let Some(msg) = msg {
                    handle_inbound(msg, &agent_id, &mut flow, &mut pause, &share_enabled, &mut state);
                }
            }

            _ = tick.tick() => {}
        }

        if !pause.paused {
            let idle = flow.is_idle();
            if flow.should_inject_now(idle, config.injection_timeout()) {
                if let Some(ready) = flow.pop_ready() {
                    let formatted = format_injection(&ready, is_orchestrator);
                    if let Err(e) = write_injection(&injection_channel, pty.master_fd(), &formatted).await {
                        tracing::warn!(kind = %ErrorKind::Terminal, error = %e, "injection delivery failed");
                    }
                }
            }
        }
    };

    // Teardown, in the required order.
    shutdown.cancel();
    state = advance(state, SidecarState::ShuttingDown);
    let _ = output.force_flush();
    if tokio::time::timeout(Duration::from_secs(2), transport).await.is_err() {
        tracing::warn!(kind = %ErrorKind::Gateway, "transport task did not join within the shutdown bound");
    }
    drop(pty);
    drop(raw_guard);
    if let Err(e) = client.unregister(&agent_id).await {
        tracing::debug!(kind = %ErrorKind::Gateway, error = %e, "gateway unregister failed");
    }

    state = advance(state, SidecarState::Exited);
    tracing::debug!(%state, "sidecar exited");
    Ok(exit_code)
}

fn handle_inbound(
    msg: InboundMessage,
    agent_id: &str,
    flow: &mut FlowController,
    pause: &mut PauseState,
    share_enabled: &Arc<AtomicBool>,
    state: &mut SidecarState,
) {
    if let Some(effect) = classify_control(&msg.content) {
        match effect {
            ControlEffect::Pause => {
                pause.paused = true;
                *state = advance(*state, SidecarState::Paused);
            }
            ControlEffect::Resume => {
                pause.paused = false;
                *state = advance(*state, SidecarState::Running);
                while let Some(backlogged) = pause.backlog.pop_front() {
                    flow.enqueue(backlogged);
                }
            }
            ControlEffect::ShareOn => {
                share_enabled.store(true, Ordering::Relaxed);
                tracing::info!("output sharing enabled");
            }
            ControlEffect::ShareOff => {
                share_enabled.store(false, Ordering::Relaxed);
                tracing::info!("output sharing disabled");
            }
        }
        return;
    }

    let turn_signal = derive_turn_signal(&msg, agent_id);
    let context = msg.context.as_ref().map(|c| OrchestrationContext {
        mode: c.mode.clone(),
        round: c.round,
        max_rounds: c.max_rounds,
        current_turn: c.current_turn.clone(),
        elapsed_ms: c.elapsed,
    });

    if pause.paused {
        pause.backlog.push_back(Injection {
            sender: msg.from,
            content: msg.content,
            received_at: Instant::now(),
            priority: Priority::Normal,
            turn_signal,
            context,
        });
        return;
    }

    let (priority, content) = match msg.content.strip_prefix('!') {
        Some(rest) => (Priority::Urgent, rest.to_owned()),
        None => (Priority::Normal, msg.content),
    };

    if let Some(warning) = flow.enqueue(Injection {
        sender: msg.from,
        content,
        received_at: Instant::now(),
        priority,
        turn_signal,
        context,
    }) {
        tracing::warn!(%warning, "injection queue overflow");
    }
}

fn derive_turn_signal(msg: &InboundMessage, agent_id: &str) -> Option<TurnSignal> {
    if msg.turn_signal.as_deref() == Some("your_turn") {
        return Some(TurnSignal::YourTurn);
    }
    if let Some(current) = &msg.current_turn {
        if current.eq_ignore_ascii_case(agent_id) {
            return Some(TurnSignal::YourTurn);
        }
        return Some(TurnSignal::TurnWait);
    }
    None
}

/// Apply a state transition, logging (rather than failing) on an illegal
/// one — the sidecar keeps running even if bookkeeping drifts.
fn advance(from: SidecarState, to: SidecarState) -> SidecarState {
    if from.can_transition_to(to) {
        to
    } else {
        tracing::debug!(%from, %to, "ignoring illegal sidecar state transition");
        from
    }
}

async fn wait_signal(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}
