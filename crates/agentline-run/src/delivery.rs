// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! DeliveryStreamer (spec §4.7): turns one turn's ordered event stream into
//! platform messages. One "live" message per turn is edited in place until
//! it would exceed the per-message cap, at which point a continuation
//! message is started. Ordering is strict because `push` is only ever
//! called from RunWorker's single sequential consumer loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use agentline_core::{AdapterEvent, DeliveryErrorEvent};
use agentline_platform::{PlatformClient, PlatformError, SentMessage};
use agentline_store::Store;

const MESSAGE_CAP: usize = 3800;

struct LiveMessage {
    message_id: i64,
    buffer: String,
}

pub struct DeliveryStreamer {
    bot_id: String,
    chat_id: i64,
    turn_id: String,
    platform: Arc<dyn PlatformClient>,
    store: Store,
    live: Option<LiveMessage>,
}

impl DeliveryStreamer {
    pub fn new(
        bot_id: impl Into<String>,
        chat_id: i64,
        turn_id: impl Into<String>,
        platform: Arc<dyn PlatformClient>,
        store: Store,
    ) -> Self {
        Self { bot_id: bot_id.into(), chat_id, turn_id: turn_id.into(), platform, store, live: None }
    }

    /// Render and deliver one event. Artifacts are not rendered here —
    /// RunWorker forwards them through `send_photo`/`send_document`
    /// directly (spec §4.6 step 7).
    pub async fn push(&mut self, seq: u64, event: &AdapterEvent) {
        let line = render_line(seq, event);

        let candidate = match &self.live {
            Some(live) => format!("{}\n{}", live.buffer, line),
            None => line.clone(),
        };

        let needs_new_message = self.live.is_none() || candidate.len() > MESSAGE_CAP;

        if needs_new_message {
            match self.send_new_message(&line).await {
                Ok(sent) => self.live = Some(LiveMessage { message_id: sent.message_id, buffer: line }),
                Err(e) => self.record_delivery_error("send_message", &e).await,
            }
        } else {
            let message_id = self.live.as_ref().unwrap().message_id;
            match self.edit_live_message(message_id, &candidate).await {
                Ok(()) => self.live.as_mut().unwrap().buffer = candidate,
                Err(e) => self.record_delivery_error("edit_message_text", &e).await,
            }
        }
    }

    async fn send_new_message(&self, text: &str) -> Result<SentMessage, PlatformError> {
        loop {
            match self.platform.send_message(self.chat_id, text).await {
                Ok(sent) => return Ok(sent),
                Err(PlatformError::RateLimited { retry_after_secs }) => {
                    self.retry_after("send_message", retry_after_secs).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn edit_live_message(&self, message_id: i64, text: &str) -> Result<(), PlatformError> {
        loop {
            match self.platform.edit_message_text(self.chat_id, message_id, text).await {
                Ok(()) => return Ok(()),
                Err(PlatformError::RateLimited { retry_after_secs }) => {
                    self.retry_after("edit_message_text", retry_after_secs).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn retry_after(&self, method: &str, retry_after_secs: u64) {
        let _ = self
            .store
            .increment_metric(
                self.bot_id.clone(),
                format!("telegram_rate_limit_retry.{method}"),
                1,
            )
            .await;
        let _ = self
            .store
            .increment_metric(self.bot_id.clone(), "telegram_rate_limit_retry_total".to_string(), 1)
            .await;
        tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
    }

    async fn record_delivery_error(&self, method: &str, error: &PlatformError) {
        let payload = DeliveryErrorEvent { method: method.to_string(), message: error.to_string() };
        let _ = self
            .store
            .append_cli_event(
                self.turn_id.clone(),
                "delivery_error".to_string(),
                serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
            )
            .await;
    }
}

fn render_line(seq: u64, event: &AdapterEvent) -> String {
    let ts = Utc::now().format("%H:%M:%S");
    let type_name = event.type_name();
    let body = match event {
        AdapterEvent::ThreadStarted { thread_id } => format!("thread {thread_id}"),
        AdapterEvent::TurnStarted => String::new(),
        AdapterEvent::Reasoning { text } => text.clone(),
        AdapterEvent::CommandStarted { command } => command.clone(),
        AdapterEvent::CommandCompleted { command, exit_code } => {
            let code = exit_code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string());
            format!("{command} (exit {code})")
        }
        AdapterEvent::BridgeStatus { status } => status.clone(),
        AdapterEvent::AssistantMessage { text } => text.clone(),
        AdapterEvent::Artifact { path, .. } => path.clone(),
        AdapterEvent::Error { message } => message.clone(),
        AdapterEvent::TurnCompleted { status, reason } => match reason {
            Some(reason) => format!("{status:?} ({reason})"),
            None => format!("{status:?}"),
        },
    };
    format!("[{seq}][{ts}][{type_name}] {body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentline_platform::MockPlatform;
    use agentline_store::Store;

    fn streamer(platform: Arc<dyn PlatformClient>) -> (DeliveryStreamer, Store) {
        let store = Store::open_in_memory().unwrap();
        (
            DeliveryStreamer::new("bot1", 1, "turn-1", platform, store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn first_event_sends_a_new_message() {
        let platform = Arc::new(MockPlatform::new());
        let (mut streamer, _store) = streamer(platform.clone());

        streamer.push(1, &AdapterEvent::AssistantMessage { text: "hi".to_string() }).await;

        assert_eq!(platform.calls().len(), 1);
        assert!(matches!(
            platform.calls()[0],
            agentline_platform::RecordedCall::SendMessage { .. }
        ));
    }

    #[tokio::test]
    async fn subsequent_events_edit_the_live_message_in_place() {
        let platform = Arc::new(MockPlatform::new());
        let (mut streamer, _store) = streamer(platform.clone());

        streamer.push(1, &AdapterEvent::Reasoning { text: "thinking".to_string() }).await;
        streamer.push(2, &AdapterEvent::AssistantMessage { text: "done".to_string() }).await;

        let calls = platform.calls();
        assert_eq!(calls.len(), 2);
        match &calls[1] {
            agentline_platform::RecordedCall::EditMessageText { text, .. } => {
                assert!(text.contains("thinking"));
                assert!(text.contains("done"));
            }
            other => panic!("expected an edit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exceeding_the_cap_starts_a_continuation_message() {
        let platform = Arc::new(MockPlatform::new());
        let (mut streamer, _store) = streamer(platform.clone());

        streamer.push(1, &AdapterEvent::AssistantMessage { text: "a".repeat(3700) }).await;
        streamer.push(2, &AdapterEvent::AssistantMessage { text: "b".repeat(200) }).await;

        let calls = platform.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], agentline_platform::RecordedCall::SendMessage { .. }));
        assert!(matches!(calls[1], agentline_platform::RecordedCall::SendMessage { .. }));
    }

    #[tokio::test]
    async fn rate_limit_is_retried_and_increments_the_counter() {
        let platform = Arc::new(MockPlatform::new());
        platform.queue_rate_limit(0);
        let (mut streamer, store) = streamer(platform.clone());

        streamer.push(1, &AdapterEvent::AssistantMessage { text: "hi".to_string() }).await;

        assert_eq!(platform.calls().len(), 1);
        let metric = store.get_metric("bot1".to_string(), "telegram_rate_limit_retry.send_message".to_string()).await.unwrap();
        assert_eq!(metric, 1);
    }

    struct AlwaysFailsPlatform;

    #[async_trait::async_trait]
    impl PlatformClient for AlwaysFailsPlatform {
        async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<SentMessage, PlatformError> {
            Err(PlatformError::Request("boom".to_string()))
        }
        async fn edit_message_text(
            &self,
            _chat_id: i64,
            _message_id: i64,
            _text: &str,
        ) -> Result<(), PlatformError> {
            Err(PlatformError::Request("boom".to_string()))
        }
        async fn answer_callback_query(
            &self,
            _callback_query_id: &str,
            _text: Option<&str>,
        ) -> Result<(), PlatformError> {
            Ok(())
        }
        async fn send_photo(&self, _chat_id: i64, _path: &str) -> Result<SentMessage, PlatformError> {
            Err(PlatformError::Request("boom".to_string()))
        }
        async fn send_document(&self, _chat_id: i64, _path: &str) -> Result<SentMessage, PlatformError> {
            Err(PlatformError::Request("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn a_non_rate_limit_failure_is_persisted_as_a_delivery_error_and_swallowed() {
        let platform: Arc<dyn PlatformClient> = Arc::new(AlwaysFailsPlatform);
        let (mut streamer, store) = streamer(platform);

        streamer.push(1, &AdapterEvent::AssistantMessage { text: "hi".to_string() }).await;

        let events = store.list_cli_events("turn-1".to_string()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "delivery_error");
    }
}
