// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! UpdateWorker (spec §4.3): the per-bot loop that leases update jobs,
//! classifies each one, enforces the owner gate, and either delegates to
//! CommandHandler or creates a turn + run job for plain text.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use agentline_config::BotConfig;
use agentline_core::{DeferredButtonAction, RunJob, Session, SessionService, Turn};
use agentline_platform::PlatformClient;
use agentline_store::Store;

use crate::classify::{classify, Classification};
use crate::commands::CommandHandler;
use crate::youtube::SearchHelper;

const OWNER_DENIAL_TEXT: &str = "this bot is private";
const MAX_ATTEMPTS: u32 = 5;

pub struct UpdateWorker {
    bot_id: String,
    owner_id: Option<String>,
    default_agent: String,
    store: Store,
    platform: Arc<dyn PlatformClient>,
    commands: CommandHandler,
    lease_ttl_ms: i64,
    poll_interval: Duration,
}

impl UpdateWorker {
    pub fn new(
        bot: &BotConfig,
        store: Store,
        platform: Arc<dyn PlatformClient>,
        search: Arc<dyn SearchHelper>,
    ) -> Self {
        let commands = CommandHandler::new(bot, store.clone(), platform.clone(), search);
        Self {
            bot_id: bot.bot_id.clone(),
            owner_id: bot.owner_id.clone(),
            default_agent: bot.default_agent.clone(),
            store,
            platform,
            commands,
            lease_ttl_ms: 30_000,
            poll_interval: Duration::from_millis(300),
        }
    }

    pub fn with_lease_ttl_ms(mut self, ms: i64) -> Self {
        self.lease_ttl_ms = ms;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn lease_owner(&self) -> String {
        format!("update-worker-{}", self.bot_id)
    }

    /// Runs forever, sleeping `poll_interval` whenever the queue is empty.
    pub async fn run(&self) {
        loop {
            self.drain_deferred_actions().await;

            match self
                .store
                .lease_next_update_job(self.lease_owner(), self.lease_ttl_ms)
                .await
            {
                Ok(Some(job)) => self.process(job.id, job.bot_id, job.update_id, job.lease.attempts).await,
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    warn!(bot_id = %self.bot_id, error = %e, "update worker: lease failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Spec §4.4: "Regenerate and next enqueue a DeferredButtonAction
    /// which the update worker picks up on its next cycle." Claims every
    /// deferred action queued for this bot and turns each into a
    /// follow-up turn + run job, re-submitting the origin turn's text
    /// (the resumed agent thread supplies the rest of the context).
    async fn drain_deferred_actions(&self) {
        let actions = match self.store.claim_due_deferred_actions(self.bot_id.clone()).await {
            Ok(actions) => actions,
            Err(e) => {
                warn!(bot_id = %self.bot_id, error = %e, "update worker: failed to claim deferred actions");
                return;
            }
        };

        for action in actions {
            if let Err(e) = self.run_deferred_action(action).await {
                warn!(bot_id = %self.bot_id, error = %e, "update worker: deferred action follow-up failed");
            }
        }
    }

    async fn run_deferred_action(&self, action: DeferredButtonAction) -> Result<(), DispatchError> {
        let session = self.store.get_session(action.session_id.clone()).await?;
        let origin_turn = self.store.get_turn(action.origin_turn_id.clone()).await?;

        let turn = Turn::new(&session, origin_turn.user_text.clone());
        self.store.create_turn(turn.clone()).await?;

        let run_job = RunJob::new(&turn);
        let inserted = self.store.create_run_job(run_job).await?;
        if !inserted {
            self.reply(session.chat_id, "a run is already active, /stop first").await;
        }
        Ok(())
    }

    async fn process(&self, job_id: String, bot_id: String, update_id: i64, attempts: u32) {
        match self.dispatch(&bot_id, update_id).await {
            Ok(()) => {
                let _ = self.store.complete_update_job(job_id).await;
            }
            Err(err) => {
                error!(bot_id = %self.bot_id, update_id, error = %err, "update worker: dispatch failed");
                if attempts >= MAX_ATTEMPTS {
                    let _ = self.store.terminal_fail_update_job(job_id, err.to_string()).await;
                } else {
                    let retry_delay_ms = backoff_ms(attempts);
                    let _ = self
                        .store
                        .fail_update_job(job_id, err.to_string(), retry_delay_ms)
                        .await;
                }
            }
        }
    }

    async fn dispatch(&self, bot_id: &str, update_id: i64) -> Result<(), DispatchError> {
        let raw = self
            .store
            .get_telegram_update_raw(bot_id.to_string(), update_id)
            .await?;

        match classify(&raw) {
            Classification::NonActionable => Ok(()),
            Classification::Command { chat_id, user_id, name, args } => {
                if self.owner_denies(user_id) {
                    self.reply(chat_id, OWNER_DENIAL_TEXT).await;
                    return Ok(());
                }
                let reply = self.commands.handle_command(chat_id, &name, &args).await;
                self.reply(chat_id, &reply).await;
                Ok(())
            }
            Classification::Callback { chat_id, user_id, callback_query_id, data } => {
                if self.owner_denies(user_id) {
                    self.platform
                        .answer_callback_query(&callback_query_id, Some(OWNER_DENIAL_TEXT))
                        .await
                        .ok();
                    return Ok(());
                }
                self.commands
                    .handle_callback(chat_id, &callback_query_id, &data)
                    .await;
                Ok(())
            }
            Classification::PlainText { chat_id, user_id, text } => {
                if self.owner_denies(user_id) {
                    self.reply(chat_id, OWNER_DENIAL_TEXT).await;
                    return Ok(());
                }
                self.queue_turn(bot_id, chat_id, text).await
            }
        }
    }

    fn owner_denies(&self, user_id: Option<i64>) -> bool {
        match &self.owner_id {
            None => false,
            Some(owner) => match user_id {
                Some(uid) => uid.to_string() != *owner,
                None => true,
            },
        }
    }

    async fn queue_turn(&self, bot_id: &str, chat_id: i64, text: String) -> Result<(), DispatchError> {
        let sessions = SessionService::new(self.store.clone());
        let session: Session = sessions
            .get_or_create_active(bot_id, chat_id, &self.default_agent)
            .await
            .map_err(|e| DispatchError::Session(e.to_string()))?;

        let turn = Turn::new(&session, text);
        self.store.create_turn(turn.clone()).await?;

        let run_job = RunJob::new(&turn);
        let inserted = self.store.create_run_job(run_job).await?;
        if !inserted {
            self.reply(chat_id, "a run is already active, /stop first").await;
        }
        Ok(())
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.platform.send_message(chat_id, text).await {
            warn!(bot_id = %self.bot_id, chat_id, error = %e, "update worker: reply failed");
        }
    }
}

fn backoff_ms(attempts: u32) -> i64 {
    let capped = attempts.min(6);
    1000i64 * 2i64.pow(capped)
}

#[derive(Debug, thiserror::Error)]
enum DispatchError {
    #[error(transparent)]
    Store(#[from] agentline_store::StoreError),
    #[error("session error: {0}")]
    Session(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentline_config::{RuntimeMode, WebhookConfig};
    use agentline_core::{ActionName, ActionToken, RunJobStatus};
    use agentline_platform::{MockPlatform, RecordedCall};
    use serde_json::json;
    use std::collections::HashMap;

    fn bot(owner_id: Option<&str>) -> BotConfig {
        BotConfig {
            bot_id: "bot1".to_string(),
            display_name: "Bot One".to_string(),
            runtime_mode: RuntimeMode::Embedded,
            owner_id: owner_id.map(str::to_string),
            default_agent: "claude".to_string(),
            webhook: WebhookConfig::default(),
            agents: HashMap::new(),
        }
    }

    fn worker(bot: &BotConfig) -> (UpdateWorker, Arc<MockPlatform>, Store) {
        let store = Store::open_in_memory().unwrap();
        let platform = Arc::new(MockPlatform::new());
        let search = Arc::new(crate::youtube::FixedAnswerSearchHelper::new("https://example.test/video"));
        let worker = UpdateWorker::new(bot, store.clone(), platform.clone(), search);
        (worker, platform, store)
    }

    #[tokio::test]
    async fn plain_text_creates_a_turn_and_run_job() {
        let bot = bot(None);
        let (worker, platform, store) = worker(&bot);
        let raw = json!({"update_id": 1, "message": {"chat": {"id": 1}, "text": "hello"}});
        store.accept_update("bot1".into(), 1, raw).await.unwrap();

        let job = store.lease_next_update_job("someone".into(), 60_000).await.unwrap().unwrap();
        worker.process(job.id, job.bot_id, job.update_id, job.lease.attempts).await;

        let summary = store.queue_summary().await.unwrap();
        assert_eq!(summary.run_jobs_by_status.get("queued"), Some(&1));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn a_second_plain_text_while_a_run_is_active_gets_a_collision_reply() {
        let bot = bot(None);
        let (worker, platform, store) = worker(&bot);

        let raw1 = json!({"update_id": 1, "message": {"chat": {"id": 1}, "text": "first"}});
        store.accept_update("bot1".into(), 1, raw1).await.unwrap();
        let job1 = store.lease_next_update_job("w".into(), 60_000).await.unwrap().unwrap();
        worker.process(job1.id, job1.bot_id, job1.update_id, job1.lease.attempts).await;

        let raw2 = json!({"update_id": 2, "message": {"chat": {"id": 1}, "text": "second"}});
        store.accept_update("bot1".into(), 2, raw2).await.unwrap();
        let job2 = store.lease_next_update_job("w".into(), 60_000).await.unwrap().unwrap();
        worker.process(job2.id, job2.bot_id, job2.update_id, job2.lease.attempts).await;

        let calls = platform.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            RecordedCall::SendMessage { text, .. } => assert!(text.contains("/stop")),
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[tokio::test]
    async fn command_from_a_non_owner_gets_the_denial_reply() {
        let bot = bot(Some("9001"));
        let (worker, platform, store) = worker(&bot);
        let raw = json!({"update_id": 1, "message": {"chat": {"id": 1}, "from": {"id": 1234}, "text": "/help"}});
        store.accept_update("bot1".into(), 1, raw).await.unwrap();
        let job = store.lease_next_update_job("w".into(), 60_000).await.unwrap().unwrap();

        worker.process(job.id, job.bot_id, job.update_id, job.lease.attempts).await;

        let calls = platform.calls();
        match &calls[0] {
            RecordedCall::SendMessage { text, .. } => assert_eq!(text, "this bot is private"),
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[tokio::test]
    async fn command_from_the_owner_is_allowed() {
        let bot = bot(Some("9001"));
        let (worker, platform, store) = worker(&bot);
        let raw = json!({"update_id": 1, "message": {"chat": {"id": 1}, "from": {"id": 9001}, "text": "/help"}});
        store.accept_update("bot1".into(), 1, raw).await.unwrap();
        let job = store.lease_next_update_job("w".into(), 60_000).await.unwrap().unwrap();

        worker.process(job.id, job.bot_id, job.update_id, job.lease.attempts).await;

        let calls = platform.calls();
        match &calls[0] {
            RecordedCall::SendMessage { text, .. } => assert!(text.contains("commands:")),
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_actionable_update_completes_without_replying() {
        let bot = bot(None);
        let (worker, platform, store) = worker(&bot);
        let raw = json!({"update_id": 1, "poll": {}});
        store.accept_update("bot1".into(), 1, raw).await.unwrap();
        let job = store.lease_next_update_job("w".into(), 60_000).await.unwrap().unwrap();

        worker.process(job.id.clone(), job.bot_id, job.update_id, job.lease.attempts).await;

        assert!(platform.calls().is_empty());
        let summary = store.queue_summary().await.unwrap();
        assert_eq!(summary.update_jobs_by_status.get("completed"), Some(&1));
    }

    #[tokio::test]
    async fn a_deferred_regenerate_action_is_drained_into_a_follow_up_run_job() {
        let bot = bot(None);
        let (worker, platform, store) = worker(&bot);

        let raw1 = json!({"update_id": 1, "message": {"chat": {"id": 1}, "text": "hello"}});
        store.accept_update("bot1".into(), 1, raw1).await.unwrap();
        let job1 = store.lease_next_update_job("w".into(), 60_000).await.unwrap().unwrap();
        worker.process(job1.id, job1.bot_id, job1.update_id, job1.lease.attempts).await;

        let summary = store.queue_summary().await.unwrap();
        assert_eq!(summary.run_jobs_by_status.get("queued"), Some(&1));

        let run_job = store.lease_next_run_job("runner".into(), 60_000).await.unwrap().unwrap();
        let turn_id = run_job.turn_id.clone();
        let mut turn = store.get_turn(turn_id.clone()).await.unwrap();
        turn.assistant_text = Some("hi there".to_string());
        store.save_turn(turn).await.unwrap();
        store
            .finish_run_job(run_job.id, RunJobStatus::Completed, None)
            .await
            .unwrap();

        let token = ActionToken::new(
            "bot1",
            1,
            ActionName::Regenerate,
            json!({"turn_id": turn_id}),
        );
        let token_str = token.token.clone();
        store.insert_action_token(token).await.unwrap();

        let raw2 = json!({
            "update_id": 2,
            "callback_query": {"id": "cb1", "data": token_str, "message": {"chat": {"id": 1}}}
        });
        store.accept_update("bot1".into(), 2, raw2).await.unwrap();
        let job2 = store.lease_next_update_job("w".into(), 60_000).await.unwrap().unwrap();
        worker.process(job2.id, job2.bot_id, job2.update_id, job2.lease.attempts).await;

        assert!(matches!(platform.calls().last(), Some(RecordedCall::AnswerCallbackQuery { .. })));

        let summary = store.queue_summary().await.unwrap();
        assert_eq!(summary.run_jobs_by_status.get("queued"), Some(&1), "regenerate is only deferred, not run yet");

        worker.drain_deferred_actions().await;

        let summary = store.queue_summary().await.unwrap();
        assert_eq!(
            summary.run_jobs_by_status.get("queued"),
            Some(&2),
            "the update worker's next cycle must turn the deferred action into a run job"
        );
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        assert_eq!(backoff_ms(0), 1000);
        assert_eq!(backoff_ms(1), 2000);
        assert_eq!(backoff_ms(10), backoff_ms(6));
    }
}
