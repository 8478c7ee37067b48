// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{PlatformClient, PlatformError, SentMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    SendMessage { chat_id: i64, text: String },
    EditMessageText { chat_id: i64, message_id: i64, text: String },
    AnswerCallbackQuery { callback_query_id: String, text: Option<String> },
    SendPhoto { chat_id: i64, path: String },
    SendDocument { chat_id: i64, path: String },
}

/// In-memory [`PlatformClient`] used by tests and the offline development
/// mode (spec §1: "the mock platform used for offline testing" is one of
/// the named external collaborators).
#[derive(Default)]
pub struct MockPlatform {
    calls: Mutex<Vec<RecordedCall>>,
    next_message_id: Mutex<i64>,
    /// When set, the next `send_message`/`edit_message_text` call fails
    /// with this rate-limit response exactly once, then clears.
    fail_next_with_rate_limit: Mutex<Option<u64>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: Mutex::new(1),
            fail_next_with_rate_limit: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn queue_rate_limit(&self, retry_after_secs: u64) {
        *self.fail_next_with_rate_limit.lock().unwrap() = Some(retry_after_secs);
    }

    fn take_rate_limit(&self) -> Option<u64> {
        self.fail_next_with_rate_limit.lock().unwrap().take()
    }

    fn next_id(&self) -> i64 {
        let mut id = self.next_message_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<SentMessage, PlatformError> {
        if let Some(retry_after_secs) = self.take_rate_limit() {
            return Err(PlatformError::RateLimited { retry_after_secs });
        }
        self.calls.lock().unwrap().push(RecordedCall::SendMessage {
            chat_id,
            text: text.to_string(),
        });
        Ok(SentMessage { message_id: self.next_id() })
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), PlatformError> {
        if let Some(retry_after_secs) = self.take_rate_limit() {
            return Err(PlatformError::RateLimited { retry_after_secs });
        }
        self.calls.lock().unwrap().push(RecordedCall::EditMessageText {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), PlatformError> {
        self.calls.lock().unwrap().push(RecordedCall::AnswerCallbackQuery {
            callback_query_id: callback_query_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, path: &str) -> Result<SentMessage, PlatformError> {
        self.calls.lock().unwrap().push(RecordedCall::SendPhoto {
            chat_id,
            path: path.to_string(),
        });
        Ok(SentMessage { message_id: self.next_id() })
    }

    async fn send_document(&self, chat_id: i64, path: &str) -> Result<SentMessage, PlatformError> {
        self.calls.lock().unwrap().push(RecordedCall::SendDocument {
            chat_id,
            path: path.to_string(),
        });
        Ok(SentMessage { message_id: self.next_id() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_message_is_recorded() {
        let platform = MockPlatform::new();
        platform.send_message(1001, "hello").await.unwrap();
        assert_eq!(
            platform.calls(),
            vec![RecordedCall::SendMessage { chat_id: 1001, text: "hello".to_string() }]
        );
    }

    #[tokio::test]
    async fn message_ids_increase_monotonically() {
        let platform = MockPlatform::new();
        let a = platform.send_message(1, "a").await.unwrap();
        let b = platform.send_message(1, "b").await.unwrap();
        assert!(b.message_id > a.message_id);
    }

    #[tokio::test]
    async fn queued_rate_limit_fires_once_then_clears() {
        let platform = MockPlatform::new();
        platform.queue_rate_limit(3);
        let err = platform.send_message(1, "x").await.unwrap_err();
        assert!(matches!(err, PlatformError::RateLimited { retry_after_secs: 3 }));
        platform.send_message(1, "y").await.unwrap();
        assert_eq!(platform.calls().len(), 1);
    }

    #[tokio::test]
    async fn callback_is_always_recorded_even_without_text() {
        let platform = MockPlatform::new();
        platform.answer_callback_query("cb1", None).await.unwrap();
        assert_eq!(
            platform.calls(),
            vec![RecordedCall::AnswerCallbackQuery { callback_query_id: "cb1".to_string(), text: None }]
        );
    }
}
