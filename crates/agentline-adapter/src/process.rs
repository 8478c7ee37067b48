// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Spawns a named external adapter binary and forwards its stdout, one
//! newline-delimited JSON `AdapterEvent` per line, onto the event channel.
//! Normalising an arbitrary agent's own output format into these events is
//! the adapter binary's job (spec §1 non-goal: "the core does not parse
//! agent-specific output formats") — this type only consumes an already
//! normalised stream and owns process lifecycle and cancellation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use agentline_core::AdapterEvent;

use crate::path::binary_on_path;
use crate::{Adapter, SessionContext};

/// Grace window between SIGTERM and SIGKILL on cancellation (spec §4.6 step 6).
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

pub struct ProcessAdapter {
    name: String,
    binary: String,
}

impl ProcessAdapter {
    pub fn new(name: impl Into<String>, binary: impl Into<String>) -> Self {
        Self { name: name.into(), binary: binary.into() }
    }
}

#[async_trait]
impl Adapter for ProcessAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        input: &str,
        ctx: SessionContext,
        tx: mpsc::Sender<AdapterEvent>,
        mut cancel: oneshot::Receiver<()>,
    ) {
        if !binary_on_path(&self.binary) {
            let _ = tx.send(AdapterEvent::startup_failure("executable not found")).await;
            return;
        }

        let mut cmd = Command::new(&self.binary);
        if let Some(thread_id) = &ctx.agent_thread_id {
            cmd.arg("--resume").arg(thread_id);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(err) => {
                let _ = tx.send(AdapterEvent::startup_failure(err.to_string())).await;
                return;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(input.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                let _ = tx.send(AdapterEvent::startup_failure("no stdout pipe")).await;
                return;
            }
        };
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    terminate(&mut child).await;
                    let _ = tx.send(AdapterEvent::cancelled()).await;
                    return;
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(text)) => {
                            if text.trim().is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<AdapterEvent>(&text) {
                                Ok(event) => {
                                    let terminal = event.is_terminal();
                                    if tx.send(event).await.is_err() || terminal {
                                        return;
                                    }
                                }
                                Err(err) => {
                                    let _ = tx.send(AdapterEvent::Error { message: format!("malformed event: {err}") }).await;
                                }
                            }
                        }
                        Ok(None) => {
                            // Stdout closed without a terminal event: treat as a crash.
                            let _ = tx.send(AdapterEvent::startup_failure("adapter exited without turn_completed")).await;
                            return;
                        }
                        Err(err) => {
                            let _ = tx.send(AdapterEvent::startup_failure(err.to_string())).await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
async fn terminate(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
    let waited = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
    if waited.is_err() {
        let _ = child.kill().await;
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut tokio::process::Child) {
    let waited = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
    if waited.is_err() {
        let _ = child.kill().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_yields_startup_failure() {
        let adapter = ProcessAdapter::new("ghost", "agentline_definitely_not_a_real_binary_xyz");
        let (tx, mut rx) = mpsc::channel(8);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        adapter.run("hi", SessionContext::default(), tx, cancel_rx).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AdapterEvent::TurnCompleted { .. }));
    }
}
