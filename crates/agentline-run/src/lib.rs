// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Executes one turn end to end: leases a RunJob, drives its adapter,
//! persists every event, and streams them to chat.

mod delivery;
mod run_worker;

pub use delivery::DeliveryStreamer;
pub use run_worker::RunWorker;
