// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Thin [`PlatformClient`] implementation over the Telegram Bot API. This
//! is the real chat-platform HTTP client spec §1 places out of scope to
//! design in depth — only enough is implemented here to satisfy the
//! interface the core consumes.

use async_trait::async_trait;
use teloxide::payloads::{SendMessageSetters, SendPhotoSetters};
use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::RequestError;

use crate::client::{PlatformClient, PlatformError, SentMessage};

pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self { bot: Bot::new(token) }
    }
}

fn map_err(err: RequestError) -> PlatformError {
    match err {
        RequestError::RetryAfter(secs) => PlatformError::RateLimited {
            retry_after_secs: secs.seconds() as u64,
        },
        other => PlatformError::Request(other.to_string()),
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<SentMessage, PlatformError> {
        let msg = self
            .bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(map_err)?;
        Ok(SentMessage { message_id: msg.id.0 as i64 })
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), PlatformError> {
        self.bot
            .edit_message_text(ChatId(chat_id), teloxide::types::MessageId(message_id as i32), text)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), PlatformError> {
        let mut req = self.bot.answer_callback_query(callback_query_id);
        if let Some(t) = text {
            req = req.text(t);
        }
        req.await.map_err(map_err)?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, path: &str) -> Result<SentMessage, PlatformError> {
        let msg = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::file(path))
            .await
            .map_err(map_err)?;
        Ok(SentMessage { message_id: msg.id.0 as i64 })
    }

    async fn send_document(&self, chat_id: i64, path: &str) -> Result<SentMessage, PlatformError> {
        let msg = self
            .bot
            .send_document(ChatId(chat_id), InputFile::file(path))
            .await
            .map_err(map_err)?;
        Ok(SentMessage { message_id: msg.id.0 as i64 })
    }
}
