// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! SessionService (spec §4.5). The business rules live here, independent of
//! any particular storage engine; `agentline-store` implements
//! [`SessionStore`] against its sqlite tables and the active-uniqueness
//! partial index. This mirrors the teacher's habit of putting a narrow
//! trait at the seam between a domain service and its backing engine.

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{Session, SessionSummary, Turn};
use crate::summary::append_summary;

/// Storage primitives `SessionService` composes into the four operations
/// spec.md §4.5 names. Implementers must honour the active-session
/// uniqueness invariant (spec §3): `insert_active_session` returns `false`
/// (not an error) on conflict so the caller can fall back to a read.
#[async_trait]
pub trait SessionStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn find_active_session(
        &self,
        bot_id: &str,
        chat_id: i64,
    ) -> Result<Option<Session>, Self::Error>;

    /// Returns `true` if inserted, `false` on active-uniqueness conflict.
    async fn insert_active_session(&self, session: &Session) -> Result<bool, Self::Error>;

    async fn mark_session_reset(&self, session_id: &str) -> Result<(), Self::Error>;

    async fn has_active_run(&self, bot_id: &str, chat_id: i64) -> Result<bool, Self::Error>;

    async fn save_session(&self, session: &Session) -> Result<(), Self::Error>;

    async fn save_summary(&self, summary: &SessionSummary) -> Result<(), Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum SwitchAgentError {
    #[error("cannot switch agent while a run is active")]
    RunActive,
}

pub struct SessionService<S> {
    store: S,
}

impl<S: SessionStore> SessionService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Atomic upsert: read the active session if one exists, otherwise try
    /// to create it, falling back to a read if a concurrent caller won the
    /// insert race (spec §4.5).
    pub async fn get_or_create_active(
        &self,
        bot_id: &str,
        chat_id: i64,
        default_agent: &str,
    ) -> Result<Session, S::Error> {
        if let Some(existing) = self.store.find_active_session(bot_id, chat_id).await? {
            return Ok(existing);
        }
        let candidate = Session::new(bot_id, chat_id, default_agent);
        if self.store.insert_active_session(&candidate).await? {
            return Ok(candidate);
        }
        match self.store.find_active_session(bot_id, chat_id).await? {
            Some(existing) => Ok(existing),
            None => Ok(candidate),
        }
    }

    /// `/new` and `/reset`: retire the current session, create a fresh one
    /// that inherits the prior rolling summary as a one-shot preamble.
    pub async fn reset(&self, session: &Session) -> Result<Session, S::Error> {
        self.store.mark_session_reset(&session.id).await?;
        let next = session.succeed();
        self.store.insert_active_session(&next).await?;
        Ok(next)
    }

    /// `/mode <agent>`: forbidden while a RunJob is active in this chat;
    /// clears the agent-thread-id (threads are per-agent) and preserves the
    /// rolling summary.
    pub async fn switch_agent(
        &self,
        session: &Session,
        new_agent: &str,
    ) -> Result<Result<Session, SwitchAgentError>, S::Error> {
        if self.store.has_active_run(&session.bot_id, session.chat_id).await? {
            return Ok(Err(SwitchAgentError::RunActive));
        }
        let mut next = session.clone();
        next.current_agent = new_agent.to_string();
        next.agent_thread_id = None;
        next.pending_preamble = true;
        self.store.save_session(&next).await?;
        Ok(Ok(next))
    }

    /// Runs the deterministic compactor over (previous summary, user_text,
    /// assistant_text) and persists both the new Session row and a
    /// SessionSummary snapshot.
    pub async fn append_turn_summary(
        &self,
        session: &Session,
        turn: &Turn,
    ) -> Result<Session, S::Error> {
        let assistant_text = turn.assistant_text.as_deref().unwrap_or("");
        let new_summary = append_summary(&session.rolling_summary, &turn.user_text, assistant_text);

        let mut next = session.clone();
        next.rolling_summary = new_summary.clone();
        next.last_turn_at = Some(turn.finished_at.unwrap_or_else(Utc::now));
        next.pending_preamble = false;
        self.store.save_session(&next).await?;

        let snapshot = SessionSummary::new(next.id.clone(), turn.id.clone(), new_summary);
        self.store.save_summary(&snapshot).await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockStore {
        active: Mutex<HashMap<(String, i64), Session>>,
        active_runs: Mutex<HashMap<(String, i64), bool>>,
        summaries: Mutex<Vec<SessionSummary>>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("mock store error")]
    struct MockError;

    #[async_trait]
    impl SessionStore for MockStore {
        type Error = MockError;

        async fn find_active_session(
            &self,
            bot_id: &str,
            chat_id: i64,
        ) -> Result<Option<Session>, Self::Error> {
            Ok(self
                .active
                .lock()
                .unwrap()
                .get(&(bot_id.to_string(), chat_id))
                .cloned())
        }

        async fn insert_active_session(&self, session: &Session) -> Result<bool, Self::Error> {
            let mut guard = self.active.lock().unwrap();
            let key = (session.bot_id.clone(), session.chat_id);
            if guard.contains_key(&key) {
                return Ok(false);
            }
            guard.insert(key, session.clone());
            Ok(true)
        }

        async fn mark_session_reset(&self, session_id: &str) -> Result<(), Self::Error> {
            let mut guard = self.active.lock().unwrap();
            guard.retain(|_, s| s.id != session_id);
            Ok(())
        }

        async fn has_active_run(&self, bot_id: &str, chat_id: i64) -> Result<bool, Self::Error> {
            Ok(*self
                .active_runs
                .lock()
                .unwrap()
                .get(&(bot_id.to_string(), chat_id))
                .unwrap_or(&false))
        }

        async fn save_session(&self, session: &Session) -> Result<(), Self::Error> {
            let mut guard = self.active.lock().unwrap();
            guard.insert((session.bot_id.clone(), session.chat_id), session.clone());
            Ok(())
        }

        async fn save_summary(&self, summary: &SessionSummary) -> Result<(), Self::Error> {
            self.summaries.lock().unwrap().push(summary.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn get_or_create_active_creates_once_then_reuses() {
        let svc = SessionService::new(MockStore::default());
        let a = svc.get_or_create_active("bot1", 1, "claude").await.unwrap();
        let b = svc.get_or_create_active("bot1", 1, "claude").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn reset_creates_new_session_inheriting_summary() {
        let svc = SessionService::new(MockStore::default());
        let mut session = svc.get_or_create_active("bot1", 1, "claude").await.unwrap();
        session.rolling_summary = "## Last turn\nhi\n".to_string();
        svc.store.save_session(&session).await.unwrap();

        let next = svc.reset(&session).await.unwrap();
        assert_ne!(next.id, session.id);
        assert_eq!(next.rolling_summary, session.rolling_summary);
        assert!(next.pending_preamble);
    }

    #[tokio::test]
    async fn switch_agent_refused_while_run_active() {
        let store = MockStore::default();
        store
            .active_runs
            .lock()
            .unwrap()
            .insert(("bot1".to_string(), 1), true);
        let svc = SessionService::new(store);
        let session = svc.get_or_create_active("bot1", 1, "claude").await.unwrap();

        let result = svc.switch_agent(&session, "gemini").await.unwrap();
        assert!(matches!(result, Err(SwitchAgentError::RunActive)));
    }

    #[tokio::test]
    async fn switch_agent_clears_thread_id_and_keeps_summary() {
        let svc = SessionService::new(MockStore::default());
        let mut session = svc.get_or_create_active("bot1", 1, "claude").await.unwrap();
        session.agent_thread_id = Some("thread-1".to_string());
        session.rolling_summary = "facts".to_string();
        svc.store.save_session(&session).await.unwrap();

        let result = svc.switch_agent(&session, "gemini").await.unwrap();
        let next = result.unwrap();
        assert_eq!(next.current_agent, "gemini");
        assert!(next.agent_thread_id.is_none());
        assert_eq!(next.rolling_summary, "facts");
        assert!(next.pending_preamble, "summary must resurface on the first turn after a mode switch");
    }

    #[tokio::test]
    async fn append_turn_summary_persists_session_and_snapshot() {
        let svc = SessionService::new(MockStore::default());
        let session = svc.get_or_create_active("bot1", 1, "claude").await.unwrap();
        let mut turn = Turn::new(&session, "hello");
        turn.assistant_text = Some("hi there".to_string());

        let next = svc.append_turn_summary(&session, &turn).await.unwrap();
        assert!(next.rolling_summary.contains("hello"));
        assert!(next.rolling_summary.contains("hi there"));
        assert!(!next.pending_preamble);
        assert_eq!(svc.store.summaries.lock().unwrap().len(), 1);
    }
}
