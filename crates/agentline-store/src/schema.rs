// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::Connection;

/// Schema per spec §3. Partial-unique indexes enforce the active-session
/// and active-run invariants at the database layer rather than with
/// in-process locking (spec §9).
const DDL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS telegram_updates (
    bot_id      TEXT NOT NULL,
    update_id   INTEGER NOT NULL,
    raw         TEXT NOT NULL,
    received_at TEXT NOT NULL,
    PRIMARY KEY (bot_id, update_id)
);

CREATE TABLE IF NOT EXISTS update_jobs (
    id                TEXT PRIMARY KEY,
    bot_id            TEXT NOT NULL,
    update_id         INTEGER NOT NULL,
    status            TEXT NOT NULL,
    lease_owner       TEXT,
    lease_expires_at  TEXT,
    available_at      TEXT NOT NULL,
    attempts          INTEGER NOT NULL DEFAULT 0,
    last_error        TEXT,
    created_at        TEXT NOT NULL,
    UNIQUE (bot_id, update_id)
);
CREATE INDEX IF NOT EXISTS idx_update_jobs_queue
    ON update_jobs (status, available_at);

CREATE TABLE IF NOT EXISTS sessions (
    id               TEXT PRIMARY KEY,
    bot_id           TEXT NOT NULL,
    chat_id          INTEGER NOT NULL,
    current_agent    TEXT NOT NULL,
    agent_thread_id  TEXT,
    rolling_summary  TEXT NOT NULL DEFAULT '',
    status           TEXT NOT NULL,
    pending_preamble INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    last_turn_at     TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_active
    ON sessions (bot_id, chat_id) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS turns (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL,
    bot_id          TEXT NOT NULL,
    chat_id         INTEGER NOT NULL,
    user_text       TEXT NOT NULL,
    assistant_text  TEXT,
    status          TEXT NOT NULL,
    error_text      TEXT,
    created_at      TEXT NOT NULL,
    finished_at     TEXT
);
CREATE INDEX IF NOT EXISTS idx_turns_session ON turns (session_id);

CREATE TABLE IF NOT EXISTS run_jobs (
    id                TEXT PRIMARY KEY,
    turn_id           TEXT NOT NULL,
    bot_id            TEXT NOT NULL,
    chat_id           INTEGER NOT NULL,
    status            TEXT NOT NULL,
    lease_owner       TEXT,
    lease_expires_at  TEXT,
    available_at      TEXT NOT NULL,
    attempts          INTEGER NOT NULL DEFAULT 0,
    last_error        TEXT,
    cancel_requested  INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_run_jobs_queue ON run_jobs (status, available_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_run_jobs_active
    ON run_jobs (bot_id, chat_id) WHERE status IN ('queued', 'leased', 'in_flight');

CREATE TABLE IF NOT EXISTS cli_events (
    turn_id     TEXT NOT NULL,
    seq         INTEGER NOT NULL,
    event_type  TEXT NOT NULL,
    payload     TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (turn_id, seq)
);

CREATE TABLE IF NOT EXISTS session_summaries (
    id          TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL,
    turn_id     TEXT NOT NULL,
    summary     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_summaries_session ON session_summaries (session_id, created_at);

CREATE TABLE IF NOT EXISTS action_tokens (
    token        TEXT PRIMARY KEY,
    bot_id       TEXT NOT NULL,
    chat_id      INTEGER NOT NULL,
    action       TEXT NOT NULL,
    payload      TEXT NOT NULL,
    expires_at   TEXT NOT NULL,
    consumed_at  TEXT
);

CREATE TABLE IF NOT EXISTS deferred_button_actions (
    id              TEXT PRIMARY KEY,
    session_id      TEXT NOT NULL,
    origin_turn_id  TEXT NOT NULL,
    action          TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    claimed         INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS metric_counters (
    bot_id      TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       INTEGER NOT NULL DEFAULT 0,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (bot_id, key)
);
"#;

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DDL)
}
