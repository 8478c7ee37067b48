// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use agentline_core::{AdapterEvent, TurnOutcome};

use crate::{Adapter, SessionContext};

/// Deterministic adapter for tests: replays a fixed script of events for
/// every call, or fails to start if configured to. Uses the real
/// `thread_started -> ... -> turn_completed` shape so RunWorker logic is
/// exercised exactly as it would be against a real adapter.
pub struct MockAdapter {
    name: String,
    script: Vec<AdapterEvent>,
    fail_to_start: bool,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), script: Vec::new(), fail_to_start: false }
    }

    /// Build the common case: one assistant message then success.
    pub fn replying(name: impl Into<String>, reply: impl Into<String>) -> Self {
        let mut a = Self::new(name);
        a.script = vec![
            AdapterEvent::ThreadStarted { thread_id: "mock-thread".to_string() },
            AdapterEvent::TurnStarted,
            AdapterEvent::AssistantMessage { text: reply.into() },
            AdapterEvent::TurnCompleted { status: TurnOutcome::Success, reason: None },
        ];
        a
    }

    pub fn with_script(mut self, script: Vec<AdapterEvent>) -> Self {
        self.script = script;
        self
    }

    pub fn failing_to_start() -> Self {
        let mut a = Self::new("broken");
        a.fail_to_start = true;
        a
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _input: &str,
        _ctx: SessionContext,
        tx: mpsc::Sender<AdapterEvent>,
        mut cancel: oneshot::Receiver<()>,
    ) {
        if self.fail_to_start {
            let _ = tx.send(AdapterEvent::startup_failure("executable not found")).await;
            return;
        }
        for event in &self.script {
            if cancel.try_recv().is_ok() {
                let _ = tx.send(AdapterEvent::cancelled()).await;
                return;
            }
            if tx.send(event.clone()).await.is_err() {
                return;
            }
            if event.is_terminal() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replying_adapter_emits_thread_started_then_message_then_completion() {
        let adapter = MockAdapter::replying("claude", "hi there");
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        adapter.run("hello", SessionContext::default(), tx, cancel_rx).await;

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert!(matches!(events[0], AdapterEvent::ThreadStarted { .. }));
        assert!(matches!(events.last().unwrap(), AdapterEvent::TurnCompleted { status: TurnOutcome::Success, .. }));
    }

    #[tokio::test]
    async fn failing_to_start_emits_single_error_terminal_event() {
        let adapter = MockAdapter::failing_to_start();
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        adapter.run("hello", SessionContext::default(), tx, cancel_rx).await;

        let event = rx.recv().await.unwrap();
        assert!(rx.recv().await.is_none());
        match event {
            AdapterEvent::TurnCompleted { status: TurnOutcome::Error, reason } => {
                assert_eq!(reason.as_deref(), Some("executable not found"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_before_first_event_yields_cancelled_terminal_event() {
        let adapter = MockAdapter::replying("claude", "hi there");
        let (tx, mut rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        cancel_tx.send(()).unwrap();
        adapter.run("hello", SessionContext::default(), tx, cancel_rx).await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AdapterEvent::TurnCompleted { status: TurnOutcome::Cancelled, .. }));
    }
}
