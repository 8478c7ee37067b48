// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! The shared HTTP surface (spec §6): `/healthz`, `/readyz`, `/metrics`,
//! and the webhook route, assembled on one axum `Router`. Grounded on the
//! teacher's `sven-node::http::serve` pattern of building a single router
//! for every subsystem's routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use agentline_store::{QueueSummary, Store};

use crate::webhook::{webhook_handler, IngressState};

pub fn router(state: IngressState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(
            "/telegram/webhook/:bot_id/:path_secret",
            post(webhook_handler),
        )
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<IngressState>) -> StatusCode {
    match state.store.queue_summary().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    counters: Vec<CounterEntry>,
    queues: QueueSummary,
}

#[derive(Debug, Serialize)]
struct CounterEntry {
    bot_id: String,
    key: String,
    value: i64,
}

async fn metrics(State(state): State<IngressState>) -> Result<Json<MetricsResponse>, StatusCode> {
    let store: &Store = &state.store;
    let counters = store
        .list_all_metrics()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?
        .into_iter()
        .map(|m| CounterEntry {
            bot_id: m.bot_id,
            key: m.key,
            value: m.value,
        })
        .collect();
    let queues = store
        .queue_summary()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(MetricsResponse { counters, queues }))
}
