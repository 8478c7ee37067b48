// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! The Store (spec §4.1): every durable operation the rest of the system
//! needs, dispatched onto the single-writer actor so sqlite only ever sees
//! one connection. Lease acquisition, the active-session/active-run
//! invariants, and update dedup all rely on the partial-unique indexes and
//! `INSERT ... ON CONFLICT DO NOTHING` / unique-violation handling in
//! `schema.rs` rather than any in-process mutex (spec §9).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use agentline_core::{
    ActionToken, CliEvent, DeferredButtonAction, MetricCounter, RunJob, RunJobStatus, Session,
    SessionStore, SessionSummary, Turn, UpdateJob,
};

use crate::actor::ActorHandle;
use crate::error::StoreError;
use crate::rows;
use crate::schema;

/// Result of `Store::accept_update` (spec §4.2).
#[derive(Debug)]
pub enum AcceptOutcome {
    Accepted(UpdateJob),
    Duplicate,
}

#[derive(Clone)]
pub struct Store {
    actor: ActorHandle,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        schema::migrate(&conn)?;
        Ok(Self {
            actor: ActorHandle::spawn(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self {
            actor: ActorHandle::spawn(conn),
        })
    }

    /// Ingress accept: insert the raw update and its UpdateJob in one
    /// transaction, keyed on `(bot_id, update_id)` (spec §4.2). A conflict on
    /// the primary key of `telegram_updates` means this update was already
    /// accepted and is reported as a duplicate rather than an error.
    pub async fn accept_update(
        &self,
        bot_id: String,
        update_id: i64,
        raw: serde_json::Value,
    ) -> Result<AcceptOutcome, StoreError> {
        self.actor
            .call(move |conn| -> Result<AcceptOutcome, StoreError> {
                let tx = conn.unchecked_transaction()?;
                let raw_text = serde_json::to_string(&raw).unwrap_or_default();
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO telegram_updates (bot_id, update_id, raw, received_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![bot_id, update_id, raw_text, Utc::now()],
                )?;
                if inserted == 0 {
                    tx.rollback()?;
                    return Ok(AcceptOutcome::Duplicate);
                }
                let job = UpdateJob::new(bot_id.clone(), update_id);
                tx.execute(
                    "INSERT INTO update_jobs \
                     (id, bot_id, update_id, status, lease_owner, lease_expires_at, \
                      available_at, attempts, last_error, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        job.id,
                        job.bot_id,
                        job.update_id,
                        rows::update_job_status_str(job.status),
                        job.lease.lease_owner,
                        job.lease.lease_expires_at,
                        job.lease.available_at,
                        job.lease.attempts,
                        job.lease.last_error,
                        job.created_at,
                    ],
                )?;
                tx.commit()?;
                Ok(AcceptOutcome::Accepted(job))
            })
            .await
    }

    /// Lease the oldest runnable UpdateJob: status `queued` with
    /// `available_at <= now`, or a `leased`/`in_flight` row abandoned by a
    /// worker that died before extending or completing it (spec §4.1
    /// "Lease reclamation": `lease_expires_at < now` makes it eligible for
    /// re-leasing by any worker — there is no separate reaper process,
    /// this query performs reclamation inline on every poll).
    pub async fn lease_next_update_job(
        &self,
        owner: String,
        lease_ttl_ms: i64,
    ) -> Result<Option<UpdateJob>, StoreError> {
        self.actor
            .call(move |conn| -> Result<Option<UpdateJob>, StoreError> {
                let tx = conn.unchecked_transaction()?;
                let now = Utc::now();
                let id: Option<String> = tx
                    .query_row(
                        "SELECT id FROM update_jobs \
                         WHERE (status = 'queued' AND available_at <= ?1) \
                         OR (status = 'leased' AND lease_expires_at <= ?1) \
                         ORDER BY available_at ASC LIMIT 1",
                        params![now],
                        |r| r.get(0),
                    )
                    .optional()?;
                let Some(id) = id else {
                    tx.rollback()?;
                    return Ok(None);
                };
                let expires = now + Duration::milliseconds(lease_ttl_ms);
                tx.execute(
                    "UPDATE update_jobs SET status = 'leased', lease_owner = ?1, \
                     lease_expires_at = ?2, attempts = attempts + 1 WHERE id = ?3",
                    params![owner, expires, id],
                )?;
                let job = tx.query_row(
                    "SELECT * FROM update_jobs WHERE id = ?1",
                    params![id],
                    rows::row_to_update_job,
                )?;
                tx.commit()?;
                Ok(Some(job))
            })
            .await
    }

    pub async fn extend_update_lease(
        &self,
        job_id: String,
        lease_ttl_ms: i64,
    ) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                let expires = Utc::now() + Duration::milliseconds(lease_ttl_ms);
                conn.execute(
                    "UPDATE update_jobs SET lease_expires_at = ?1 WHERE id = ?2",
                    params![expires, job_id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn complete_update_job(&self, job_id: String) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "UPDATE update_jobs SET status = 'completed' WHERE id = ?1",
                    params![job_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Requeue with backoff on failure, recording the error for observability.
    pub async fn fail_update_job(
        &self,
        job_id: String,
        error: String,
        retry_delay_ms: i64,
    ) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                let available_at = Utc::now() + Duration::milliseconds(retry_delay_ms);
                conn.execute(
                    "UPDATE update_jobs SET status = 'queued', lease_owner = NULL, \
                     lease_expires_at = NULL, available_at = ?1, last_error = ?2 WHERE id = ?3",
                    params![available_at, error, job_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Re-fetch the raw envelope stored by `accept_update` for a given
    /// update job, since `UpdateJob` itself carries no payload (spec §4.3:
    /// "load the raw payload").
    pub async fn get_telegram_update_raw(
        &self,
        bot_id: String,
        update_id: i64,
    ) -> Result<serde_json::Value, StoreError> {
        self.actor
            .call(move |conn| -> Result<serde_json::Value, StoreError> {
                let raw_text: String = conn
                    .query_row(
                        "SELECT raw FROM telegram_updates WHERE bot_id = ?1 AND update_id = ?2",
                        params![bot_id, update_id],
                        |r| r.get(0),
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                        other => StoreError::Sqlite(other),
                    })?;
                Ok(serde_json::from_str(&raw_text).unwrap_or(serde_json::Value::Null))
            })
            .await
    }

    /// Oldest active RunJob for a chat, if any (spec §4.4 `/stop`: the
    /// cancellation path needs the run's id, not just whether one exists).
    pub async fn find_active_run_job(
        &self,
        bot_id: String,
        chat_id: i64,
    ) -> Result<Option<RunJob>, StoreError> {
        self.actor
            .call(move |conn| -> Result<Option<RunJob>, StoreError> {
                conn.query_row(
                    "SELECT * FROM run_jobs WHERE bot_id = ?1 AND chat_id = ?2 \
                     AND status IN ('queued', 'leased', 'in_flight') \
                     ORDER BY created_at ASC LIMIT 1",
                    params![bot_id, chat_id],
                    rows::row_to_run_job,
                )
                .optional()
                .map_err(StoreError::Sqlite)
            })
            .await
    }

    /// Terminal failure: no further retry, distinct from `fail_update_job`
    /// which always re-queues (spec §4.1: "otherwise it stays failed").
    pub async fn terminal_fail_update_job(
        &self,
        job_id: String,
        error: String,
    ) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "UPDATE update_jobs SET status = 'failed', last_error = ?1 WHERE id = ?2",
                    params![error, job_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Direct lookup by id, for RunWorker loading the session a leased
    /// Turn belongs to (not necessarily still the chat's *active* session).
    pub async fn get_session(&self, session_id: String) -> Result<Session, StoreError> {
        self.actor
            .call(move |conn| -> Result<Session, StoreError> {
                conn.query_row(
                    "SELECT * FROM sessions WHERE id = ?1",
                    params![session_id],
                    rows::row_to_session,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                    other => StoreError::Sqlite(other),
                })
            })
            .await
    }

    pub async fn create_turn(&self, turn: Turn) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "INSERT INTO turns \
                     (id, session_id, bot_id, chat_id, user_text, assistant_text, status, \
                      error_text, created_at, finished_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        turn.id,
                        turn.session_id,
                        turn.bot_id,
                        turn.chat_id,
                        turn.user_text,
                        turn.assistant_text,
                        rows::turn_status_str(turn.status),
                        turn.error_text,
                        turn.created_at,
                        turn.finished_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_turn(&self, turn_id: String) -> Result<Turn, StoreError> {
        self.actor
            .call(move |conn| -> Result<Turn, StoreError> {
                conn.query_row(
                    "SELECT * FROM turns WHERE id = ?1",
                    params![turn_id],
                    rows::row_to_turn,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                    other => StoreError::Sqlite(other),
                })
            })
            .await
    }

    pub async fn save_turn(&self, turn: Turn) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "UPDATE turns SET assistant_text = ?1, status = ?2, error_text = ?3, \
                     finished_at = ?4 WHERE id = ?5",
                    params![
                        turn.assistant_text,
                        rows::turn_status_str(turn.status),
                        turn.error_text,
                        turn.finished_at,
                        turn.id,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Create a RunJob for a Turn. Not bundled into the same transaction as
    /// `create_turn` — spec §4.3 does not require turn-creation and run-job
    /// creation to be atomic together, only that at most one active RunJob
    /// exists per chat, which the partial-unique index enforces on insert.
    pub async fn create_run_job(&self, run_job: RunJob) -> Result<bool, StoreError> {
        self.actor
            .call(move |conn| -> Result<bool, StoreError> {
                let result = conn.execute(
                    "INSERT INTO run_jobs \
                     (id, turn_id, bot_id, chat_id, status, lease_owner, lease_expires_at, \
                      available_at, attempts, last_error, cancel_requested, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        run_job.id,
                        run_job.turn_id,
                        run_job.bot_id,
                        run_job.chat_id,
                        rows::run_job_status_str(run_job.status),
                        run_job.lease.lease_owner,
                        run_job.lease.lease_expires_at,
                        run_job.lease.available_at,
                        run_job.lease.attempts,
                        run_job.lease.last_error,
                        run_job.cancel_requested as i64,
                        run_job.created_at,
                    ],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Lease the oldest runnable RunJob: status `queued` with
    /// `available_at <= now`, or a `leased`/`in_flight` row abandoned by a
    /// worker that died before extending or completing it (spec §4.1
    /// "Lease reclamation" — see the matching comment on
    /// `lease_next_update_job`).
    pub async fn lease_next_run_job(
        &self,
        owner: String,
        lease_ttl_ms: i64,
    ) -> Result<Option<RunJob>, StoreError> {
        self.actor
            .call(move |conn| -> Result<Option<RunJob>, StoreError> {
                let tx = conn.unchecked_transaction()?;
                let now = Utc::now();
                let id: Option<String> = tx
                    .query_row(
                        "SELECT id FROM run_jobs \
                         WHERE (status = 'queued' AND available_at <= ?1) \
                         OR (status IN ('leased', 'in_flight') AND lease_expires_at <= ?1) \
                         ORDER BY available_at ASC LIMIT 1",
                        params![now],
                        |r| r.get(0),
                    )
                    .optional()?;
                let Some(id) = id else {
                    tx.rollback()?;
                    return Ok(None);
                };
                let expires = now + Duration::milliseconds(lease_ttl_ms);
                tx.execute(
                    "UPDATE run_jobs SET status = 'leased', lease_owner = ?1, \
                     lease_expires_at = ?2, attempts = attempts + 1 WHERE id = ?3",
                    params![owner, expires, id],
                )?;
                let job = tx.query_row(
                    "SELECT * FROM run_jobs WHERE id = ?1",
                    params![id],
                    rows::row_to_run_job,
                )?;
                tx.commit()?;
                Ok(Some(job))
            })
            .await
    }

    pub async fn extend_run_lease(
        &self,
        run_id: String,
        lease_ttl_ms: i64,
    ) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                let expires = Utc::now() + Duration::milliseconds(lease_ttl_ms);
                conn.execute(
                    "UPDATE run_jobs SET lease_expires_at = ?1 WHERE id = ?2",
                    params![expires, run_id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn mark_run_in_flight(&self, run_id: String) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "UPDATE run_jobs SET status = 'in_flight' WHERE id = ?1",
                    params![run_id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn request_run_cancel(&self, run_id: String) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "UPDATE run_jobs SET cancel_requested = 1 WHERE id = ?1",
                    params![run_id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_run_job(&self, run_id: String) -> Result<RunJob, StoreError> {
        self.actor
            .call(move |conn| -> Result<RunJob, StoreError> {
                conn.query_row(
                    "SELECT * FROM run_jobs WHERE id = ?1",
                    params![run_id],
                    rows::row_to_run_job,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                    other => StoreError::Sqlite(other),
                })
            })
            .await
    }

    pub async fn finish_run_job(
        &self,
        run_id: String,
        status: RunJobStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "UPDATE run_jobs SET status = ?1, last_error = ?2 WHERE id = ?3",
                    params![rows::run_job_status_str(status), error, run_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Requeue a failed RunJob with backoff, distinct from `finish_run_job`
    /// (spec §4.6 step 9: "attempts within limit -> re-queue with backoff;
    /// otherwise terminal").
    pub async fn retry_run_job(
        &self,
        run_id: String,
        error: String,
        retry_delay_ms: i64,
    ) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                let available_at = Utc::now() + Duration::milliseconds(retry_delay_ms);
                conn.execute(
                    "UPDATE run_jobs SET status = 'queued', lease_owner = NULL, \
                     lease_expires_at = NULL, available_at = ?1, last_error = ?2 WHERE id = ?3",
                    params![available_at, error, run_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Append a CliEvent, allocating the next `seq` for this turn under the
    /// actor's serialisation so concurrent callers never collide.
    pub async fn append_cli_event(
        &self,
        turn_id: String,
        event_type: String,
        payload: serde_json::Value,
    ) -> Result<CliEvent, StoreError> {
        self.actor
            .call(move |conn| -> Result<CliEvent, StoreError> {
                let next_seq: i64 = conn.query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM cli_events WHERE turn_id = ?1",
                    params![turn_id],
                    |r| r.get(0),
                )?;
                let created_at = Utc::now();
                let payload_text = serde_json::to_string(&payload).unwrap_or_default();
                conn.execute(
                    "INSERT INTO cli_events (turn_id, seq, event_type, payload, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![turn_id, next_seq, event_type, payload_text, created_at],
                )?;
                Ok(CliEvent {
                    turn_id,
                    seq: next_seq as u64,
                    event_type,
                    payload,
                    created_at,
                })
            })
            .await
    }

    pub async fn list_cli_events(&self, turn_id: String) -> Result<Vec<CliEvent>, StoreError> {
        self.actor
            .call(move |conn| -> Result<Vec<CliEvent>, StoreError> {
                let mut stmt = conn
                    .prepare("SELECT * FROM cli_events WHERE turn_id = ?1 ORDER BY seq ASC")?;
                let rows = stmt
                    .query_map(params![turn_id], rows::row_to_cli_event)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn insert_action_token(&self, token: ActionToken) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                let payload_text = serde_json::to_string(&token.payload).unwrap_or_default();
                conn.execute(
                    "INSERT INTO action_tokens \
                     (token, bot_id, chat_id, action, payload, expires_at, consumed_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        token.token,
                        token.bot_id,
                        token.chat_id,
                        rows::action_name_str(token.action),
                        payload_text,
                        token.expires_at,
                        token.consumed_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn find_action_token(
        &self,
        token: String,
    ) -> Result<Option<ActionToken>, StoreError> {
        self.actor
            .call(move |conn| -> Result<Option<ActionToken>, StoreError> {
                conn.query_row(
                    "SELECT * FROM action_tokens WHERE token = ?1",
                    params![token],
                    rows::row_to_action_token,
                )
                .optional()
                .map_err(StoreError::Sqlite)
            })
            .await
    }

    /// Atomically mark a token consumed, returning `true` only if it was
    /// usable (unexpired, unconsumed) at the moment of the update.
    pub async fn consume_action_token(&self, token: String) -> Result<bool, StoreError> {
        self.actor
            .call(move |conn| -> Result<bool, StoreError> {
                let now = Utc::now();
                let changed = conn.execute(
                    "UPDATE action_tokens SET consumed_at = ?1 \
                     WHERE token = ?2 AND consumed_at IS NULL AND expires_at > ?1",
                    params![now, token],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    pub async fn insert_deferred_action(
        &self,
        action: DeferredButtonAction,
    ) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "INSERT INTO deferred_button_actions \
                     (id, session_id, origin_turn_id, action, created_at, claimed) \
                     VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                    params![
                        action.id,
                        action.session_id,
                        action.origin_turn_id,
                        rows::action_name_str(action.action),
                        action.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Claim (mark claimed, return) every unclaimed deferred action queued
    /// for a session, oldest first.
    pub async fn claim_deferred_actions(
        &self,
        session_id: String,
    ) -> Result<Vec<DeferredButtonAction>, StoreError> {
        self.actor
            .call(move |conn| -> Result<Vec<DeferredButtonAction>, StoreError> {
                let tx = conn.unchecked_transaction()?;
                let claimed = {
                    let mut stmt = tx.prepare(
                        "SELECT * FROM deferred_button_actions \
                         WHERE session_id = ?1 AND claimed = 0 ORDER BY created_at ASC",
                    )?;
                    stmt.query_map(params![session_id], rows::row_to_deferred_action)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                };
                tx.execute(
                    "UPDATE deferred_button_actions SET claimed = 1 \
                     WHERE session_id = ?1 AND claimed = 0",
                    params![session_id],
                )?;
                tx.commit()?;
                Ok(claimed)
            })
            .await
    }

    /// Claim every unclaimed deferred action across all of one bot's
    /// sessions, oldest first (spec §4.4: "the update worker picks up on
    /// its next cycle" — this is that pickup, scoped to the bot a given
    /// UpdateWorker owns rather than to one session at a time).
    pub async fn claim_due_deferred_actions(
        &self,
        bot_id: String,
    ) -> Result<Vec<DeferredButtonAction>, StoreError> {
        self.actor
            .call(move |conn| -> Result<Vec<DeferredButtonAction>, StoreError> {
                let tx = conn.unchecked_transaction()?;
                let claimed = {
                    let mut stmt = tx.prepare(
                        "SELECT * FROM deferred_button_actions \
                         WHERE claimed = 0 AND session_id IN (SELECT id FROM sessions WHERE bot_id = ?1) \
                         ORDER BY created_at ASC",
                    )?;
                    stmt.query_map(params![bot_id], rows::row_to_deferred_action)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                };
                tx.execute(
                    "UPDATE deferred_button_actions SET claimed = 1 \
                     WHERE claimed = 0 AND session_id IN (SELECT id FROM sessions WHERE bot_id = ?1)",
                    params![bot_id],
                )?;
                tx.commit()?;
                Ok(claimed)
            })
            .await
    }

    pub async fn increment_metric(
        &self,
        bot_id: String,
        key: String,
        delta: i64,
    ) -> Result<(), StoreError> {
        self.actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "INSERT INTO metric_counters (bot_id, key, value, updated_at) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT (bot_id, key) DO UPDATE SET \
                     value = value + excluded.value, updated_at = excluded.updated_at",
                    params![bot_id, key, delta, Utc::now()],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_metric(&self, bot_id: String, key: String) -> Result<i64, StoreError> {
        self.actor
            .call(move |conn| -> Result<i64, StoreError> {
                let value: Option<i64> = conn
                    .query_row(
                        "SELECT value FROM metric_counters WHERE bot_id = ?1 AND key = ?2",
                        params![bot_id, key],
                        |r| r.get(0),
                    )
                    .optional()?;
                Ok(value.unwrap_or(0))
            })
            .await
    }

    pub async fn list_metrics(&self, bot_id: String) -> Result<Vec<MetricCounter>, StoreError> {
        self.actor
            .call(move |conn| -> Result<Vec<MetricCounter>, StoreError> {
                let mut stmt = conn.prepare(
                    "SELECT bot_id, key, value, updated_at FROM metric_counters WHERE bot_id = ?1",
                )?;
                let rows = stmt
                    .query_map(params![bot_id], |r| {
                        Ok(MetricCounter {
                            bot_id: r.get(0)?,
                            key: r.get(1)?,
                            value: r.get(2)?,
                            updated_at: r.get::<_, DateTime<Utc>>(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Every counter across every bot, for the `/metrics` readout.
    pub async fn list_all_metrics(&self) -> Result<Vec<MetricCounter>, StoreError> {
        self.actor
            .call(move |conn| -> Result<Vec<MetricCounter>, StoreError> {
                let mut stmt =
                    conn.prepare("SELECT bot_id, key, value, updated_at FROM metric_counters")?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok(MetricCounter {
                            bot_id: r.get(0)?,
                            key: r.get(1)?,
                            value: r.get(2)?,
                            updated_at: r.get::<_, DateTime<Utc>>(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Aggregated job-status counts for the `/metrics` readout (spec §4.8).
    pub async fn queue_summary(&self) -> Result<QueueSummary, StoreError> {
        self.actor
            .call(move |conn| -> Result<QueueSummary, StoreError> {
                let mut update_jobs_by_status = HashMap::new();
                {
                    let mut stmt =
                        conn.prepare("SELECT status, COUNT(*) FROM update_jobs GROUP BY status")?;
                    let mut rows = stmt.query([])?;
                    while let Some(row) = rows.next()? {
                        let status: String = row.get(0)?;
                        let count: i64 = row.get(1)?;
                        update_jobs_by_status.insert(status, count);
                    }
                }
                let mut run_jobs_by_status = HashMap::new();
                {
                    let mut stmt =
                        conn.prepare("SELECT status, COUNT(*) FROM run_jobs GROUP BY status")?;
                    let mut rows = stmt.query([])?;
                    while let Some(row) = rows.next()? {
                        let status: String = row.get(0)?;
                        let count: i64 = row.get(1)?;
                        run_jobs_by_status.insert(status, count);
                    }
                }
                let in_flight_runs: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM run_jobs WHERE status = 'in_flight'",
                    [],
                    |r| r.get(0),
                )?;
                Ok(QueueSummary {
                    update_jobs_by_status,
                    run_jobs_by_status,
                    in_flight_runs,
                })
            })
            .await
    }
}

/// Jobs-by-status aggregate for both queues, plus the in-flight run count.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueSummary {
    pub update_jobs_by_status: HashMap<String, i64>,
    pub run_jobs_by_status: HashMap<String, i64>,
    pub in_flight_runs: i64,
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct SessionStoreError(#[from] StoreError);

#[async_trait]
impl SessionStore for Store {
    type Error = SessionStoreError;

    async fn find_active_session(
        &self,
        bot_id: &str,
        chat_id: i64,
    ) -> Result<Option<Session>, Self::Error> {
        let bot_id = bot_id.to_string();
        Ok(self
            .actor
            .call(move |conn| -> Result<Option<Session>, StoreError> {
                conn.query_row(
                    "SELECT * FROM sessions WHERE bot_id = ?1 AND chat_id = ?2 AND status = 'active'",
                    params![bot_id, chat_id],
                    rows::row_to_session,
                )
                .optional()
                .map_err(StoreError::Sqlite)
            })
            .await?)
    }

    async fn insert_active_session(&self, session: &Session) -> Result<bool, Self::Error> {
        let session = session.clone();
        Ok(self
            .actor
            .call(move |conn| -> Result<bool, StoreError> {
                let result = conn.execute(
                    "INSERT INTO sessions \
                     (id, bot_id, chat_id, current_agent, agent_thread_id, rolling_summary, \
                      status, pending_preamble, created_at, last_turn_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        session.id,
                        session.bot_id,
                        session.chat_id,
                        session.current_agent,
                        session.agent_thread_id,
                        session.rolling_summary,
                        rows::session_status_str(session.status),
                        session.pending_preamble as i64,
                        session.created_at,
                        session.last_turn_at,
                    ],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await?)
    }

    async fn mark_session_reset(&self, session_id: &str) -> Result<(), Self::Error> {
        let session_id = session_id.to_string();
        Ok(self
            .actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "UPDATE sessions SET status = 'reset' WHERE id = ?1",
                    params![session_id],
                )?;
                Ok(())
            })
            .await?)
    }

    async fn has_active_run(&self, bot_id: &str, chat_id: i64) -> Result<bool, Self::Error> {
        let bot_id = bot_id.to_string();
        Ok(self
            .actor
            .call(move |conn| -> Result<bool, StoreError> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM run_jobs WHERE bot_id = ?1 AND chat_id = ?2 \
                     AND status IN ('queued', 'leased', 'in_flight')",
                    params![bot_id, chat_id],
                    |r| r.get(0),
                )?;
                Ok(count > 0)
            })
            .await?)
    }

    async fn save_session(&self, session: &Session) -> Result<(), Self::Error> {
        let session = session.clone();
        Ok(self
            .actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "UPDATE sessions SET current_agent = ?1, agent_thread_id = ?2, \
                     rolling_summary = ?3, status = ?4, pending_preamble = ?5, last_turn_at = ?6 \
                     WHERE id = ?7",
                    params![
                        session.current_agent,
                        session.agent_thread_id,
                        session.rolling_summary,
                        rows::session_status_str(session.status),
                        session.pending_preamble as i64,
                        session.last_turn_at,
                        session.id,
                    ],
                )?;
                Ok(())
            })
            .await?)
    }

    async fn save_summary(&self, summary: &SessionSummary) -> Result<(), Self::Error> {
        let summary = summary.clone();
        Ok(self
            .actor
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "INSERT INTO session_summaries (id, session_id, turn_id, summary, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        summary.id,
                        summary.session_id,
                        summary.turn_id,
                        summary.summary,
                        summary.created_at,
                    ],
                )?;
                Ok(())
            })
            .await?)
    }
}
