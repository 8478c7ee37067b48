// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod client;
mod mock;
mod telegram;

pub use client::{PlatformClient, PlatformError, SentMessage};
pub use mock::{MockPlatform, RecordedCall};
pub use telegram::TelegramClient;
