// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Long-poll ingress alternative to the webhook (spec §4.2): calls
//! `getUpdates` with a moving offset, persisted per bot so a restart
//! doesn't re-deliver already-accepted updates. When `local_mode` is set
//! (the configured platform base URL points at a known local address,
//! i.e. a mock server under test) the offset is reset to zero on every
//! restart instead, so a restarted mock doesn't desync from a stale
//! offset left over from a previous run.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use tracing::{debug, warn};

use agentline_store::Store;

use crate::accept::accept;

const OFFSET_METRIC_KEY: &str = "poller_offset";

pub struct Poller {
    bot: Bot,
    bot_id: String,
    store: Store,
    poll_interval: Duration,
    local_mode: bool,
}

impl Poller {
    pub fn new(bot: Bot, bot_id: impl Into<String>, store: Store, local_mode: bool) -> Self {
        Self {
            bot,
            bot_id: bot_id.into(),
            store,
            poll_interval: Duration::from_millis(500),
            local_mode,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn current_offset(&self) -> i64 {
        if self.local_mode {
            return 0;
        }
        self.store
            .get_metric(self.bot_id.clone(), OFFSET_METRIC_KEY.into())
            .await
            .unwrap_or(0)
    }

    async fn advance_offset(&self, new_offset: i64) {
        let current = self
            .store
            .get_metric(self.bot_id.clone(), OFFSET_METRIC_KEY.into())
            .await
            .unwrap_or(0);
        if new_offset > current {
            let delta = new_offset - current;
            let _ = self
                .store
                .increment_metric(self.bot_id.clone(), OFFSET_METRIC_KEY.into(), delta)
                .await;
        }
    }

    /// Runs forever, sleeping `poll_interval` between empty polls.
    pub async fn run(&self) {
        let mut offset = self.current_offset().await as i32;
        loop {
            let updates = self.bot.get_updates().offset(offset).timeout(1).await;

            let updates = match updates {
                Ok(u) => u,
                Err(e) => {
                    warn!(bot_id = %self.bot_id, error = %e, "poller: getUpdates failed");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            if updates.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            for update in &updates {
                if matches!(update.kind, UpdateKind::Error(_)) {
                    continue;
                }
                let raw = match serde_json::to_value(update) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(bot_id = %self.bot_id, error = %e, "poller: could not serialise update");
                        continue;
                    }
                };
                if let Err(e) = accept(&self.store, &self.bot_id, raw).await {
                    warn!(bot_id = %self.bot_id, error = %e, "poller: accept failed");
                }
                offset = update.id.0 as i32 + 1;
            }
            self.advance_offset(offset as i64).await;
            debug!(bot_id = %self.bot_id, offset, "poller: advanced offset");
        }
    }
}
