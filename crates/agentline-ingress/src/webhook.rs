// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! `POST /telegram/webhook/{bot_id}/{path_secret}` (spec §4.2, §6). Secret
//! comparison is constant-time, grounded on the teacher's Slack HMAC
//! verification (`sven-node/src/http/slack.rs::verify_slack_signature`),
//! though here the secret is a bearer value rather than an HMAC digest.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use subtle::ConstantTimeEq;

use agentline_store::Store;

#[derive(Debug, Clone)]
pub struct BotIngressConfig {
    pub bot_id: String,
    pub path_secret: String,
    pub header_secret: Option<String>,
}

#[derive(Clone)]
pub struct IngressState {
    pub store: Store,
    pub bots: Arc<HashMap<String, BotIngressConfig>>,
}

impl IngressState {
    pub fn new(store: Store, bots: Vec<BotIngressConfig>) -> Self {
        let bots = bots.into_iter().map(|b| (b.bot_id.clone(), b)).collect();
        Self {
            store,
            bots: Arc::new(bots),
        }
    }
}

fn secrets_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 1
}

pub async fn webhook_handler(
    State(state): State<IngressState>,
    Path((bot_id, path_secret)): Path<(String, String)>,
    headers: HeaderMap,
    Json(raw): Json<serde_json::Value>,
) -> StatusCode {
    let Some(bot) = state.bots.get(&bot_id) else {
        return StatusCode::UNAUTHORIZED;
    };
    if !secrets_match(&bot.path_secret, &path_secret) {
        return StatusCode::UNAUTHORIZED;
    }
    if let Some(expected) = &bot.header_secret {
        let provided = headers
            .get("x-agentline-secret")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !secrets_match(expected, provided) {
            return StatusCode::UNAUTHORIZED;
        }
    }

    match crate::accept::accept(&state.store, &bot_id, raw).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_secrets_match() {
        assert!(secrets_match("abc123", "abc123"));
    }

    #[test]
    fn differing_secrets_do_not_match() {
        assert!(!secrets_match("abc123", "abc124"));
    }

    #[test]
    fn differing_length_secrets_do_not_match() {
        assert!(!secrets_match("abc123", "abc12"));
    }
}
