// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Ingress (spec §4.2): the webhook and poller entry points that run the
//! shared accept procedure, plus the axum router that also carries the
//! process's `/healthz`, `/readyz` and `/metrics` surface.

mod accept;
mod envelope;
mod http;
mod poller;
mod webhook;

pub use accept::{accept, AcceptError};
pub use envelope::{parse_update, ParsedUpdate};
pub use http::router;
pub use poller::Poller;
pub use webhook::{BotIngressConfig, IngressState};
