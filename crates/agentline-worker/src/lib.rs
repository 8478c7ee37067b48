// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Per-bot control plane: classifies accepted Telegram updates, enforces
//! the owner gate, runs the slash-command/callback surface, and hands
//! plain-text turns off to the run pipeline.

mod classify;
mod commands;
mod nl_intent;
mod providers;
mod update_worker;
mod youtube;

pub use classify::{classify, Classification};
pub use commands::CommandHandler;
pub use providers::{format_providers_reply, provider_statuses, ProviderStatus};
pub use update_worker::UpdateWorker;
pub use youtube::{FixedAnswerSearchHelper, SearchError, SearchHelper, YoutubeSearchHelper};
