// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! The adapter's event vocabulary (spec §6 "Adapter interface"). An adapter
//! yields a lazy, finite sequence of these; RunWorker persists each as a
//! `CliEvent` row in arrival order and DeliveryStreamer renders each to chat.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Success,
    Error,
    Cancelled,
}

/// One event in an adapter's output stream for a single turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterEvent {
    /// Always first. Carries a new or resumed agent-thread id.
    ThreadStarted { thread_id: String },
    TurnStarted,
    Reasoning { text: String },
    CommandStarted { command: String },
    CommandCompleted { command: String, exit_code: Option<i32> },
    BridgeStatus { status: String },
    AssistantMessage { text: String },
    /// A file the adapter wants forwarded to chat (image -> photo, else document).
    Artifact { path: String, is_image: bool },
    Error { message: String },
    /// Always last and exactly once.
    TurnCompleted {
        status: TurnOutcome,
        reason: Option<String>,
    },
}

impl AdapterEvent {
    /// The `event_type` string stored on the `CliEvent` row.
    pub fn type_name(&self) -> &'static str {
        match self {
            AdapterEvent::ThreadStarted { .. } => "thread_started",
            AdapterEvent::TurnStarted => "turn_started",
            AdapterEvent::Reasoning { .. } => "reasoning",
            AdapterEvent::CommandStarted { .. } => "command_started",
            AdapterEvent::CommandCompleted { .. } => "command_completed",
            AdapterEvent::BridgeStatus { .. } => "bridge_status",
            AdapterEvent::AssistantMessage { .. } => "assistant_message",
            AdapterEvent::Artifact { .. } => "artifact",
            AdapterEvent::Error { .. } => "error",
            AdapterEvent::TurnCompleted { .. } => "turn_completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AdapterEvent::TurnCompleted { .. })
    }

    /// Synthetic event RunWorker persists when it force-cancels a run.
    pub fn cancelled() -> Self {
        AdapterEvent::TurnCompleted {
            status: TurnOutcome::Cancelled,
            reason: None,
        }
    }

    /// Synthetic event for adapter startup failure (spec §6: "executable
    /// not found") or runtime crash/timeout.
    pub fn startup_failure(reason: impl Into<String>) -> Self {
        AdapterEvent::TurnCompleted {
            status: TurnOutcome::Error,
            reason: Some(reason.into()),
        }
    }
}

/// Synthetic event recorded against a turn when a platform send fails with
/// a non-429 error (spec §4.7). Not emitted by adapters; DeliveryStreamer
/// manufactures it directly as a `CliEvent` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryErrorEvent {
    pub method: String,
    pub message: String,
}
