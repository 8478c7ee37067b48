// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod domain;
mod events;
mod session_service;
mod summary;

pub use domain::{
    ActionName, ActionToken, Bot, CliEvent, DeferredButtonAction, Lease, MetricCounter, RunJob,
    RunJobStatus, Session, SessionStatus, SessionSummary, TelegramUpdate, Turn, TurnStatus,
    UpdateJob, UpdateJobStatus,
};
pub use events::{AdapterEvent, DeliveryErrorEvent, TurnOutcome};
pub use session_service::{SessionService, SessionStore, SwitchAgentError};
pub use summary::{append_summary, MAX_SUMMARY_CHARS};
