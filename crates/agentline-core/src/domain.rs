// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Persisted entities shared by every component. Types here carry no
//! database or transport logic of their own — `agentline-store` maps them
//! to rows, `agentline-worker`/`agentline-run` build and mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Identity of a logical bot instance (spec §3 `Bot`). Immutable after the
/// process that hosts it starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub bot_id: String,
    pub display_name: String,
    pub owner_id: Option<String>,
    pub default_agent: String,
}

/// Raw inbound update, keyed `(bot_id, update_id)` for deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub bot_id: String,
    pub update_id: i64,
    /// Verbatim JSON envelope, stored so workers can re-parse fields the
    /// initial classification step did not need.
    pub raw: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Shared lease/state-machine fields for both queue tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub available_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl Lease {
    pub fn new() -> Self {
        Self {
            lease_owner: None,
            lease_expires_at: None,
            available_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

impl Default for Lease {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateJobStatus {
    Queued,
    Leased,
    Completed,
    Failed,
}

/// One accepted update, state machine `queued -> leased -> (completed|failed)`.
/// Unique by `(bot_id, update_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateJob {
    pub id: String,
    pub bot_id: String,
    pub update_id: i64,
    pub status: UpdateJobStatus,
    pub lease: Lease,
    pub created_at: DateTime<Utc>,
}

impl UpdateJob {
    pub fn new(bot_id: impl Into<String>, update_id: i64) -> Self {
        Self {
            id: new_id(),
            bot_id: bot_id.into(),
            update_id,
            status: UpdateJobStatus::Queued,
            lease: Lease::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Reset,
}

/// Logical conversation state per `(bot_id, chat_id)`. At most one row with
/// `status = active` may exist for a given `(bot_id, chat_id)` — enforced by
/// the store's partial-unique index, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub bot_id: String,
    pub chat_id: i64,
    pub current_agent: String,
    pub agent_thread_id: Option<String>,
    pub rolling_summary: String,
    pub status: SessionStatus,
    /// Set on `/new`, `/reset`, and `/mode` switch; cleared after the first
    /// turn that follows is persisted. While set, RunWorker injects
    /// `rolling_summary` as a preamble ahead of the user's text.
    pub pending_preamble: bool,
    pub created_at: DateTime<Utc>,
    pub last_turn_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(bot_id: impl Into<String>, chat_id: i64, default_agent: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            bot_id: bot_id.into(),
            chat_id,
            current_agent: default_agent.into(),
            agent_thread_id: None,
            rolling_summary: String::new(),
            status: SessionStatus::Active,
            pending_preamble: false,
            created_at: Utc::now(),
            last_turn_at: None,
        }
    }

    /// Build the successor session created by `/new`/`/reset`, inheriting
    /// the rolling summary and flagging it for one-time preamble injection.
    pub fn succeed(&self) -> Self {
        let mut next = Session::new(self.bot_id.clone(), self.chat_id, self.current_agent.clone());
        next.rolling_summary = self.rolling_summary.clone();
        next.pending_preamble = !next.rolling_summary.is_empty();
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Queued,
    InFlight,
    Completed,
    Failed,
    Cancelled,
}

/// One user request to the agent and its eventual reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub session_id: String,
    pub bot_id: String,
    pub chat_id: i64,
    pub user_text: String,
    pub assistant_text: Option<String>,
    pub status: TurnStatus,
    pub error_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(session: &Session, user_text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            session_id: session.id.clone(),
            bot_id: session.bot_id.clone(),
            chat_id: session.chat_id,
            user_text: user_text.into(),
            assistant_text: None,
            status: TurnStatus::Queued,
            error_text: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunJobStatus {
    Queued,
    Leased,
    InFlight,
    Completed,
    Failed,
    Cancelled,
}

/// Drives execution of one Turn. At most one RunJob per `(bot_id, chat_id)`
/// may be in `{queued, leased, in_flight}` at a time — enforced by the
/// store's partial-unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJob {
    pub id: String,
    pub turn_id: String,
    pub bot_id: String,
    pub chat_id: i64,
    pub status: RunJobStatus,
    pub lease: Lease,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
}

impl RunJob {
    pub fn new(turn: &Turn) -> Self {
        Self {
            id: new_id(),
            turn_id: turn.id.clone(),
            bot_id: turn.bot_id.clone(),
            chat_id: turn.chat_id,
            status: RunJobStatus::Queued,
            lease: Lease::new(),
            cancel_requested: false,
            created_at: Utc::now(),
        }
    }
}

/// One ordered event emitted by the adapter for a turn. `(turn_id, seq)` is
/// unique; `seq` is strictly increasing from 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliEvent {
    pub turn_id: String,
    pub seq: u64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of the rolling summary, written after every completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub session_id: String,
    pub turn_id: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn new(session_id: impl Into<String>, turn_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            session_id: session_id.into(),
            turn_id: turn_id.into(),
            summary: summary.into(),
            created_at: Utc::now(),
        }
    }
}

/// Action encoded by a pressed inline button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    Summary,
    Regenerate,
    Next,
    Stop,
}

/// Opaque token bound to a pending button callback. TTL default 24h.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionToken {
    pub token: String,
    pub bot_id: String,
    pub chat_id: i64,
    pub action: ActionName,
    pub payload: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl ActionToken {
    pub const DEFAULT_TTL_HOURS: i64 = 24;

    pub fn new(bot_id: impl Into<String>, chat_id: i64, action: ActionName, payload: serde_json::Value) -> Self {
        Self {
            token: new_id(),
            bot_id: bot_id.into(),
            chat_id,
            action,
            payload,
            expires_at: Utc::now() + chrono::Duration::hours(Self::DEFAULT_TTL_HOURS),
            consumed_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_usable(&self) -> bool {
        !self.is_expired() && !self.is_consumed()
    }
}

/// A follow-up turn intent produced by a button press, queued for the next
/// UpdateWorker cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredButtonAction {
    pub id: String,
    pub session_id: String,
    pub origin_turn_id: String,
    pub action: ActionName,
    pub created_at: DateTime<Utc>,
}

impl DeferredButtonAction {
    pub fn new(session_id: impl Into<String>, origin_turn_id: impl Into<String>, action: ActionName) -> Self {
        Self {
            id: new_id(),
            session_id: session_id.into(),
            origin_turn_id: origin_turn_id.into(),
            action,
            created_at: Utc::now(),
        }
    }
}

/// `(bot_id, key) -> int64 value`. Monotonic; the store upserts with `+=`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricCounter {
    pub bot_id: String,
    pub key: String,
    pub value: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_succeed_inherits_summary_and_flags_preamble() {
        let mut s = Session::new("bot1", 1, "claude");
        s.rolling_summary = "## Last turn\nsaid hi\n".to_string();
        let next = s.succeed();
        assert_eq!(next.rolling_summary, s.rolling_summary);
        assert!(next.pending_preamble);
        assert_ne!(next.id, s.id);
    }

    #[test]
    fn session_succeed_with_empty_summary_does_not_flag_preamble() {
        let s = Session::new("bot1", 1, "claude");
        let next = s.succeed();
        assert!(!next.pending_preamble);
    }

    #[test]
    fn action_token_expired_is_not_usable() {
        let mut t = ActionToken::new("bot1", 1, ActionName::Stop, serde_json::Value::Null);
        t.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(t.is_expired());
        assert!(!t.is_usable());
    }

    #[test]
    fn action_token_consumed_is_not_usable() {
        let mut t = ActionToken::new("bot1", 1, ActionName::Summary, serde_json::Value::Null);
        t.consumed_at = Some(Utc::now());
        assert!(!t.is_usable());
    }

    #[test]
    fn action_token_fresh_is_usable() {
        let t = ActionToken::new("bot1", 1, ActionName::Next, serde_json::Value::Null);
        assert!(t.is_usable());
    }

    #[test]
    fn update_job_starts_queued_with_zero_attempts() {
        let job = UpdateJob::new("bot1", 42);
        assert_eq!(job.status, UpdateJobStatus::Queued);
        assert_eq!(job.lease.attempts, 0);
    }

    #[test]
    fn run_job_carries_turn_identity() {
        let session = Session::new("bot1", 1, "claude");
        let turn = Turn::new(&session, "hello");
        let job = RunJob::new(&turn);
        assert_eq!(job.turn_id, turn.id);
        assert_eq!(job.bot_id, "bot1");
        assert_eq!(job.chat_id, 1);
        assert_eq!(job.status, RunJobStatus::Queued);
    }
}
