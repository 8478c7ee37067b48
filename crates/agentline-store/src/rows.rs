// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use rusqlite::Row;

use agentline_core::{
    ActionName, ActionToken, CliEvent, DeferredButtonAction, Lease, RunJob, RunJobStatus, Session,
    SessionStatus, SessionSummary, Turn, TurnStatus, UpdateJob, UpdateJobStatus,
};

pub fn update_job_status_str(s: UpdateJobStatus) -> &'static str {
    match s {
        UpdateJobStatus::Queued => "queued",
        UpdateJobStatus::Leased => "leased",
        UpdateJobStatus::Completed => "completed",
        UpdateJobStatus::Failed => "failed",
    }
}

pub fn update_job_status_from_str(s: &str) -> UpdateJobStatus {
    match s {
        "leased" => UpdateJobStatus::Leased,
        "completed" => UpdateJobStatus::Completed,
        "failed" => UpdateJobStatus::Failed,
        _ => UpdateJobStatus::Queued,
    }
}

pub fn run_job_status_str(s: RunJobStatus) -> &'static str {
    match s {
        RunJobStatus::Queued => "queued",
        RunJobStatus::Leased => "leased",
        RunJobStatus::InFlight => "in_flight",
        RunJobStatus::Completed => "completed",
        RunJobStatus::Failed => "failed",
        RunJobStatus::Cancelled => "cancelled",
    }
}

pub fn run_job_status_from_str(s: &str) -> RunJobStatus {
    match s {
        "leased" => RunJobStatus::Leased,
        "in_flight" => RunJobStatus::InFlight,
        "completed" => RunJobStatus::Completed,
        "failed" => RunJobStatus::Failed,
        "cancelled" => RunJobStatus::Cancelled,
        _ => RunJobStatus::Queued,
    }
}

pub fn turn_status_str(s: TurnStatus) -> &'static str {
    match s {
        TurnStatus::Queued => "queued",
        TurnStatus::InFlight => "in_flight",
        TurnStatus::Completed => "completed",
        TurnStatus::Failed => "failed",
        TurnStatus::Cancelled => "cancelled",
    }
}

pub fn turn_status_from_str(s: &str) -> TurnStatus {
    match s {
        "in_flight" => TurnStatus::InFlight,
        "completed" => TurnStatus::Completed,
        "failed" => TurnStatus::Failed,
        "cancelled" => TurnStatus::Cancelled,
        _ => TurnStatus::Queued,
    }
}

pub fn session_status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Active => "active",
        SessionStatus::Reset => "reset",
    }
}

pub fn session_status_from_str(s: &str) -> SessionStatus {
    match s {
        "reset" => SessionStatus::Reset,
        _ => SessionStatus::Active,
    }
}

pub fn action_name_str(a: ActionName) -> &'static str {
    match a {
        ActionName::Summary => "summary",
        ActionName::Regenerate => "regenerate",
        ActionName::Next => "next",
        ActionName::Stop => "stop",
    }
}

pub fn action_name_from_str(s: &str) -> ActionName {
    match s {
        "regenerate" => ActionName::Regenerate,
        "next" => ActionName::Next,
        "stop" => ActionName::Stop,
        _ => ActionName::Summary,
    }
}

pub fn row_to_update_job(row: &Row) -> rusqlite::Result<UpdateJob> {
    Ok(UpdateJob {
        id: row.get("id")?,
        bot_id: row.get("bot_id")?,
        update_id: row.get("update_id")?,
        status: update_job_status_from_str(&row.get::<_, String>("status")?),
        lease: Lease {
            lease_owner: row.get("lease_owner")?,
            lease_expires_at: row.get::<_, Option<DateTime<Utc>>>("lease_expires_at")?,
            available_at: row.get("available_at")?,
            attempts: row.get::<_, i64>("attempts")? as u32,
            last_error: row.get("last_error")?,
        },
        created_at: row.get("created_at")?,
    })
}

pub fn row_to_run_job(row: &Row) -> rusqlite::Result<RunJob> {
    Ok(RunJob {
        id: row.get("id")?,
        turn_id: row.get("turn_id")?,
        bot_id: row.get("bot_id")?,
        chat_id: row.get("chat_id")?,
        status: run_job_status_from_str(&row.get::<_, String>("status")?),
        lease: Lease {
            lease_owner: row.get("lease_owner")?,
            lease_expires_at: row.get::<_, Option<DateTime<Utc>>>("lease_expires_at")?,
            available_at: row.get("available_at")?,
            attempts: row.get::<_, i64>("attempts")? as u32,
            last_error: row.get("last_error")?,
        },
        cancel_requested: row.get::<_, i64>("cancel_requested")? != 0,
        created_at: row.get("created_at")?,
    })
}

pub fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get("id")?,
        bot_id: row.get("bot_id")?,
        chat_id: row.get("chat_id")?,
        current_agent: row.get("current_agent")?,
        agent_thread_id: row.get("agent_thread_id")?,
        rolling_summary: row.get("rolling_summary")?,
        status: session_status_from_str(&row.get::<_, String>("status")?),
        pending_preamble: row.get::<_, i64>("pending_preamble")? != 0,
        created_at: row.get("created_at")?,
        last_turn_at: row.get("last_turn_at")?,
    })
}

pub fn row_to_turn(row: &Row) -> rusqlite::Result<Turn> {
    Ok(Turn {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        bot_id: row.get("bot_id")?,
        chat_id: row.get("chat_id")?,
        user_text: row.get("user_text")?,
        assistant_text: row.get("assistant_text")?,
        status: turn_status_from_str(&row.get::<_, String>("status")?),
        error_text: row.get("error_text")?,
        created_at: row.get("created_at")?,
        finished_at: row.get("finished_at")?,
    })
}

pub fn row_to_cli_event(row: &Row) -> rusqlite::Result<CliEvent> {
    let payload_text: String = row.get("payload")?;
    Ok(CliEvent {
        turn_id: row.get("turn_id")?,
        seq: row.get::<_, i64>("seq")? as u64,
        event_type: row.get("event_type")?,
        payload: serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null),
        created_at: row.get("created_at")?,
    })
}

pub fn row_to_summary(row: &Row) -> rusqlite::Result<SessionSummary> {
    Ok(SessionSummary {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        turn_id: row.get("turn_id")?,
        summary: row.get("summary")?,
        created_at: row.get("created_at")?,
    })
}

pub fn row_to_action_token(row: &Row) -> rusqlite::Result<ActionToken> {
    let payload_text: String = row.get("payload")?;
    Ok(ActionToken {
        token: row.get("token")?,
        bot_id: row.get("bot_id")?,
        chat_id: row.get("chat_id")?,
        action: action_name_from_str(&row.get::<_, String>("action")?),
        payload: serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null),
        expires_at: row.get("expires_at")?,
        consumed_at: row.get("consumed_at")?,
    })
}

pub fn row_to_deferred_action(row: &Row) -> rusqlite::Result<DeferredButtonAction> {
    Ok(DeferredButtonAction {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        origin_turn_id: row.get("origin_turn_id")?,
        action: action_name_from_str(&row.get::<_, String>("action")?),
        created_at: row.get("created_at")?,
    })
}
