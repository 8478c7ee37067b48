// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("platform request failed: {0}")]
    Request(String),
}

/// Result of a successful outbound send, used by DeliveryStreamer to track
/// the live message id for in-place edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: i64,
}

/// Chat-platform HTTP client interface (spec §6, "Platform client
/// interface (consumed)"). Transport, auth, and wire format are entirely
/// the concrete client's concern; this is the only surface the core
/// depends on.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<SentMessage, PlatformError>;

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), PlatformError>;

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), PlatformError>;

    async fn send_photo(&self, chat_id: i64, path: &str) -> Result<SentMessage, PlatformError>;

    async fn send_document(&self, chat_id: i64, path: &str) -> Result<SentMessage, PlatformError>;
}
