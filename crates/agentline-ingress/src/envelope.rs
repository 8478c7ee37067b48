// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Pulls the fields the rest of the system needs out of a raw Telegram
//! update envelope. The full envelope is always stored verbatim (spec
//! §4.2) — this is only a classification aid for UpdateWorker, not the
//! system of record.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ParsedUpdate {
    pub update_id: i64,
    pub chat_id: i64,
    pub user_id: Option<i64>,
    pub text: Option<String>,
    pub callback_query_id: Option<String>,
    pub callback_data: Option<String>,
}

/// Returns `None` if the envelope carries none of the shapes we recognise
/// (message or callback_query) — UpdateWorker treats that as non-actionable.
pub fn parse_update(raw: &Value) -> Option<ParsedUpdate> {
    let update_id = raw.get("update_id")?.as_i64()?;

    if let Some(message) = raw.get("message") {
        let chat_id = message.get("chat")?.get("id")?.as_i64()?;
        let user_id = message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(|v| v.as_i64());
        let text = message
            .get("text")
            .and_then(|t| t.as_str())
            .map(|s| s.to_string());
        return Some(ParsedUpdate {
            update_id,
            chat_id,
            user_id,
            text,
            callback_query_id: None,
            callback_data: None,
        });
    }

    if let Some(cbq) = raw.get("callback_query") {
        let message = cbq.get("message")?;
        let chat_id = message.get("chat")?.get("id")?.as_i64()?;
        let user_id = cbq
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(|v| v.as_i64());
        let callback_query_id = cbq.get("id").and_then(|v| v.as_str()).map(|s| s.to_string());
        let callback_data = cbq
            .get("data")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        return Some(ParsedUpdate {
            update_id,
            chat_id,
            user_id,
            text: None,
            callback_query_id,
            callback_data,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_plain_text_message() {
        let raw = json!({
            "update_id": 1,
            "message": {
                "chat": {"id": 1001},
                "from": {"id": 9001},
                "text": "hello"
            }
        });
        let parsed = parse_update(&raw).unwrap();
        assert_eq!(parsed.update_id, 1);
        assert_eq!(parsed.chat_id, 1001);
        assert_eq!(parsed.user_id, Some(9001));
        assert_eq!(parsed.text.as_deref(), Some("hello"));
    }

    #[test]
    fn parses_a_callback_query() {
        let raw = json!({
            "update_id": 2,
            "callback_query": {
                "id": "cbq-1",
                "from": {"id": 9001},
                "message": {"chat": {"id": 1001}},
                "data": "action:summary"
            }
        });
        let parsed = parse_update(&raw).unwrap();
        assert_eq!(parsed.callback_query_id.as_deref(), Some("cbq-1"));
        assert_eq!(parsed.callback_data.as_deref(), Some("action:summary"));
    }

    #[test]
    fn unrecognised_shape_returns_none() {
        let raw = json!({"update_id": 3, "poll": {}});
        assert!(parse_update(&raw).is_none());
    }

    #[test]
    fn missing_update_id_returns_none() {
        let raw = json!({"message": {"chat": {"id": 1}, "text": "hi"}});
        assert!(parse_update(&raw).is_none());
    }
}
