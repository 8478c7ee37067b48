// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! The accept procedure shared by the webhook and the poller (spec §4.2):
//! insert-dedupe, create the UpdateJob, bump the matching counter.

use agentline_store::{AcceptOutcome, Store, StoreError};

use crate::envelope::parse_update;

#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    #[error("update envelope missing update_id")]
    MissingUpdateId,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn accept(
    store: &Store,
    bot_id: &str,
    raw: serde_json::Value,
) -> Result<AcceptOutcome, AcceptError> {
    let update_id = raw
        .get("update_id")
        .and_then(|v| v.as_i64())
        .ok_or(AcceptError::MissingUpdateId)?;

    let outcome = store
        .accept_update(bot_id.to_string(), update_id, raw.clone())
        .await?;

    match &outcome {
        AcceptOutcome::Accepted(_) => {
            store
                .increment_metric(bot_id.to_string(), "webhook_accept_total".into(), 1)
                .await?;
        }
        AcceptOutcome::Duplicate => {
            store
                .increment_metric(bot_id.to_string(), "webhook_duplicate_update".into(), 1)
                .await?;
        }
    }

    // Classification is advisory at this layer only: UpdateWorker re-parses
    // the raw payload itself (spec §4.3). A payload that doesn't match any
    // recognised shape is still accepted and queued — it becomes a
    // non-actionable update dropped silently by UpdateWorker.
    let _ = parse_update(&raw);

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentline_store::Store;
    use serde_json::json;

    #[tokio::test]
    async fn accepting_twice_counts_one_accept_and_one_duplicate() {
        let store = Store::open_in_memory().unwrap();
        let raw = json!({"update_id": 1, "message": {"chat": {"id": 1}, "text": "hi"}});

        let first = accept(&store, "bot1", raw.clone()).await.unwrap();
        assert!(matches!(first, AcceptOutcome::Accepted(_)));
        let second = accept(&store, "bot1", raw).await.unwrap();
        assert!(matches!(second, AcceptOutcome::Duplicate));

        assert_eq!(
            store
                .get_metric("bot1".into(), "webhook_accept_total".into())
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .get_metric("bot1".into(), "webhook_duplicate_update".into())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn missing_update_id_is_rejected_before_touching_the_store() {
        let store = Store::open_in_memory().unwrap();
        let result = accept(&store, "bot1", json!({"message": {}})).await;
        assert!(matches!(result, Err(AcceptError::MissingUpdateId)));
    }
}
