// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! RunWorker (spec §4.6): leases one RunJob at a time, drives its adapter
//! end to end, and persists + delivers every event it produces. Cancellation
//! is cooperative: the adapter races its own cancel receiver against its
//! event loop (see `agentline-adapter`), so RunWorker's job is only to
//! watch for `cancel_requested`/timeout and fire that signal once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use agentline_adapter::{Adapter, SessionContext};
use agentline_config::BotConfig;
use agentline_core::{
    AdapterEvent, DeliveryErrorEvent, RunJob, RunJobStatus, Session, SessionService, SessionStore,
    Turn, TurnOutcome, TurnStatus,
};
use agentline_platform::PlatformClient;
use agentline_store::Store;

use crate::delivery::DeliveryStreamer;

const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(900);
const MAX_RUN_ATTEMPTS: u32 = 5;

enum RunOutcome {
    Success { assistant_text: String, thread_id: Option<String> },
    Failure { reason: String, cancelled: bool },
}

pub struct RunWorker {
    bot_id: String,
    store: Store,
    platform: Arc<dyn PlatformClient>,
    adapters: HashMap<String, Arc<dyn Adapter>>,
    lease_ttl_ms: i64,
    poll_interval: Duration,
    run_timeout: Duration,
}

impl RunWorker {
    pub fn new(
        bot: &BotConfig,
        store: Store,
        platform: Arc<dyn PlatformClient>,
        adapters: HashMap<String, Arc<dyn Adapter>>,
    ) -> Self {
        Self {
            bot_id: bot.bot_id.clone(),
            store,
            platform,
            adapters,
            lease_ttl_ms: 30_000,
            poll_interval: Duration::from_millis(250),
            run_timeout: DEFAULT_RUN_TIMEOUT,
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

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    fn lease_owner(&self) -> String {
        format!("run-worker-{}", self.bot_id)
    }

    pub async fn run(&self) {
        loop {
            match self.store.lease_next_run_job(self.lease_owner(), self.lease_ttl_ms).await {
                Ok(Some(run_job)) => self.execute(run_job).await,
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    warn!(bot_id = %self.bot_id, error = %e, "run worker: lease failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn execute(&self, run_job: RunJob) {
        let turn = match self.store.get_turn(run_job.turn_id.clone()).await {
            Ok(t) => t,
            Err(e) => {
                let _ = self
                    .store
                    .finish_run_job(run_job.id.clone(), RunJobStatus::Failed, Some(e.to_string()))
                    .await;
                return;
            }
        };

        if let Err(e) = self.store.mark_run_in_flight(run_job.id.clone()).await {
            warn!(bot_id = %self.bot_id, run_id = %run_job.id, error = %e, "run worker: could not mark in-flight");
        }
        let mut turn = turn;
        turn.status = TurnStatus::InFlight;
        let _ = self.store.save_turn(turn.clone()).await;

        let session = match self.store.get_session(turn.session_id.clone()).await {
            Ok(s) => s,
            Err(e) => {
                self.fail_immediately(run_job, turn, format!("session missing: {e}")).await;
                return;
            }
        };

        let outcome = self.run_adapter(&run_job, &session, &turn).await;
        self.finalize(run_job, session, turn, outcome).await;
    }

    async fn run_adapter(&self, run_job: &RunJob, session: &Session, turn: &Turn) -> RunOutcome {
        let adapter = self.adapters.get(&session.current_agent).cloned();

        let input = if session.pending_preamble && !session.rolling_summary.is_empty() {
            format!("{}\n\n{}", session.rolling_summary, turn.user_text)
        } else {
            turn.user_text.clone()
        };
        let ctx = SessionContext { agent_thread_id: session.agent_thread_id.clone() };

        let (tx, rx) = mpsc::channel::<AdapterEvent>(64);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let adapter_handle = match adapter {
            Some(adapter) => Some(tokio::spawn(async move {
                adapter.run(&input, ctx, tx, cancel_rx).await
            })),
            None => {
                drop(cancel_rx);
                let reason = format!("no adapter registered for {}", session.current_agent);
                let _ = tx.send(AdapterEvent::startup_failure(reason)).await;
                None
            }
        };

        let supervisor = self.spawn_supervisor(run_job.id.clone(), cancel_tx);

        let outcome = self.consume_events(turn, rx).await;

        supervisor.abort();
        if let Some(handle) = adapter_handle {
            let _ = handle.await;
        }

        outcome
    }

    /// Extends the lease at half-TTL cadence and fires the adapter's cancel
    /// signal once `cancel_requested` is set or the run timeout elapses.
    /// Runs until `execute` aborts it after the event loop returns.
    fn spawn_supervisor(&self, run_id: String, cancel_tx: oneshot::Sender<()>) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let bot_id = self.bot_id.clone();
        let lease_ttl_ms = self.lease_ttl_ms;
        let poll_interval = self.poll_interval;
        let run_timeout = self.run_timeout;

        tokio::spawn(async move {
            let half_ttl = Duration::from_millis((lease_ttl_ms / 2).max(1) as u64);
            let started = Instant::now();
            let mut last_extend = Instant::now();
            let mut cancel_tx = Some(cancel_tx);

            loop {
                tokio::time::sleep(poll_interval).await;

                if last_extend.elapsed() >= half_ttl {
                    if let Err(e) = store.extend_run_lease(run_id.clone(), lease_ttl_ms).await {
                        warn!(bot_id = %bot_id, run_id = %run_id, error = %e, "run worker: lease extension failed, abandoning");
                        return;
                    }
                    last_extend = Instant::now();
                }

                if let Some(tx) = cancel_tx.take() {
                    let timed_out = started.elapsed() >= run_timeout;
                    let cancel_requested = match store.get_run_job(run_id.clone()).await {
                        Ok(job) => job.cancel_requested,
                        Err(_) => false,
                    };
                    if timed_out || cancel_requested {
                        let _ = tx.send(());
                    } else {
                        cancel_tx = Some(tx);
                    }
                }
            }
        })
    }

    async fn consume_events(&self, turn: &Turn, mut rx: mpsc::Receiver<AdapterEvent>) -> RunOutcome {
        let mut streamer = DeliveryStreamer::new(
            self.bot_id.clone(),
            turn.chat_id,
            turn.id.clone(),
            self.platform.clone(),
            self.store.clone(),
        );
        let mut assistant_parts: Vec<String> = Vec::new();
        let mut thread_id: Option<String> = None;
        let mut seq: u64 = 0;

        while let Some(event) = rx.recv().await {
            seq += 1;
            let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
            if let Err(e) = self
                .store
                .append_cli_event(turn.id.clone(), event.type_name().to_string(), payload)
                .await
            {
                warn!(bot_id = %self.bot_id, turn_id = %turn.id, error = %e, "run worker: failed to persist event");
            }

            match &event {
                AdapterEvent::ThreadStarted { thread_id: tid } => thread_id = Some(tid.clone()),
                AdapterEvent::AssistantMessage { text } => assistant_parts.push(text.clone()),
                AdapterEvent::Artifact { path, is_image } => {
                    self.forward_artifact(turn, path, *is_image).await;
                    continue;
                }
                _ => {}
            }

            streamer.push(seq, &event).await;

            if let AdapterEvent::TurnCompleted { status, reason } = &event {
                return match status {
                    TurnOutcome::Success => RunOutcome::Success {
                        assistant_text: assistant_parts.join(""),
                        thread_id,
                    },
                    TurnOutcome::Cancelled => RunOutcome::Failure {
                        reason: reason.clone().unwrap_or_else(|| "cancelled".to_string()),
                        cancelled: true,
                    },
                    TurnOutcome::Error => RunOutcome::Failure {
                        reason: reason.clone().unwrap_or_else(|| "adapter error".to_string()),
                        cancelled: false,
                    },
                };
            }
        }

        RunOutcome::Failure {
            reason: "adapter closed without a terminal event".to_string(),
            cancelled: false,
        }
    }

    async fn forward_artifact(&self, turn: &Turn, path: &str, is_image: bool) {
        let result = if is_image {
            self.platform.send_photo(turn.chat_id, path).await
        } else {
            self.platform.send_document(turn.chat_id, path).await
        };
        if let Err(e) = result {
            let method = if is_image { "send_photo" } else { "send_document" };
            let payload = DeliveryErrorEvent { method: method.to_string(), message: e.to_string() };
            let _ = self
                .store
                .append_cli_event(
                    turn.id.clone(),
                    "delivery_error".to_string(),
                    serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
                )
                .await;
        }
    }

    async fn finalize(&self, run_job: RunJob, session: Session, mut turn: Turn, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Success { assistant_text, thread_id } => {
                turn.assistant_text = Some(assistant_text);
                turn.status = TurnStatus::Completed;
                turn.finished_at = Some(chrono::Utc::now());
                let _ = self.store.save_turn(turn.clone()).await;

                let mut next_session = session.clone();
                if let Some(tid) = thread_id {
                    next_session.agent_thread_id = Some(tid);
                }
                let _ = SessionStore::save_session(&self.store, &next_session).await;

                let sessions = SessionService::new(self.store.clone());
                if let Err(e) = sessions.append_turn_summary(&next_session, &turn).await {
                    warn!(bot_id = %self.bot_id, turn_id = %turn.id, error = %e, "run worker: failed to persist summary");
                }

                let _ = self.store.finish_run_job(run_job.id, RunJobStatus::Completed, None).await;
            }
            RunOutcome::Failure { reason, cancelled } => {
                turn.status = if cancelled { TurnStatus::Cancelled } else { TurnStatus::Failed };
                turn.error_text = Some(reason.clone());
                turn.finished_at = Some(chrono::Utc::now());
                let _ = self.store.save_turn(turn.clone()).await;

                let _ = self
                    .store
                    .increment_metric(self.bot_id.clone(), format!("provider_run_failed.{}", session.current_agent), 1)
                    .await;

                if cancelled || run_job.lease.attempts >= MAX_RUN_ATTEMPTS {
                    let status = if cancelled { RunJobStatus::Cancelled } else { RunJobStatus::Failed };
                    let _ = self.store.finish_run_job(run_job.id, status, Some(reason)).await;
                } else {
                    let delay_ms = backoff_ms(run_job.lease.attempts);
                    let _ = self.store.retry_run_job(run_job.id, reason, delay_ms).await;
                }
            }
        }
    }

    async fn fail_immediately(&self, run_job: RunJob, mut turn: Turn, reason: String) {
        turn.status = TurnStatus::Failed;
        turn.error_text = Some(reason.clone());
        turn.finished_at = Some(chrono::Utc::now());
        let _ = self.store.save_turn(turn).await;
        let _ = self.store.finish_run_job(run_job.id, RunJobStatus::Failed, Some(reason)).await;
    }
}

fn backoff_ms(attempts: u32) -> i64 {
    let capped = attempts.min(6);
    1000i64 * 2i64.pow(capped)
}
