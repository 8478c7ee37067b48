// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Durable sqlite-backed storage for agentline (spec §4.1): the two job
//! queues, sessions, turns, cli events, summaries, action tokens, deferred
//! button actions and metric counters, all behind a single-writer actor.

mod actor;
mod error;
mod rows;
mod schema;
mod store;

pub use error::StoreError;
pub use store::{AcceptOutcome, QueueSummary, SessionStoreError, Store};
