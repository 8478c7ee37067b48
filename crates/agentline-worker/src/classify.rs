// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Classifies a raw accepted update into the four shapes UpdateWorker acts
//! on (spec §4.3 step 1): command, plain text, inline callback, or
//! non-actionable.

use agentline_ingress::{parse_update, ParsedUpdate};

use crate::nl_intent::rewrite_nl_youtube_intent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Command {
        chat_id: i64,
        user_id: Option<i64>,
        name: String,
        args: String,
    },
    PlainText {
        chat_id: i64,
        user_id: Option<i64>,
        text: String,
    },
    Callback {
        chat_id: i64,
        user_id: Option<i64>,
        callback_query_id: String,
        data: String,
    },
    NonActionable,
}

pub fn classify(raw: &serde_json::Value) -> Classification {
    match parse_update(raw) {
        Some(parsed) => classify_parsed(parsed),
        None => Classification::NonActionable,
    }
}

fn classify_parsed(parsed: ParsedUpdate) -> Classification {
    if let (Some(callback_query_id), Some(data)) = (parsed.callback_query_id, parsed.callback_data)
    {
        return Classification::Callback {
            chat_id: parsed.chat_id,
            user_id: parsed.user_id,
            callback_query_id,
            data,
        };
    }

    let Some(text) = parsed.text else {
        return Classification::NonActionable;
    };

    let text = rewrite_nl_youtube_intent(&text).unwrap_or(text);

    if let Some(rest) = text.strip_prefix('/') {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("").to_lowercase();
        let args = parts.next().unwrap_or("").trim().to_string();
        return Classification::Command {
            chat_id: parsed.chat_id,
            user_id: parsed.user_id,
            name,
            args,
        };
    }

    Classification::PlainText {
        chat_id: parsed.chat_id,
        user_id: parsed.user_id,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_a_slash_command_with_args() {
        let raw = json!({"update_id": 1, "message": {"chat": {"id": 1}, "from": {"id": 9}, "text": "/mode claude"}});
        let c = classify(&raw);
        assert_eq!(
            c,
            Classification::Command {
                chat_id: 1,
                user_id: Some(9),
                name: "mode".to_string(),
                args: "claude".to_string(),
            }
        );
    }

    #[test]
    fn classifies_plain_text_as_a_turn() {
        let raw = json!({"update_id": 1, "message": {"chat": {"id": 1}, "text": "hello there"}});
        let c = classify(&raw);
        assert_eq!(
            c,
            Classification::PlainText {
                chat_id: 1,
                user_id: None,
                text: "hello there".to_string(),
            }
        );
    }

    #[test]
    fn classifies_a_callback_query() {
        let raw = json!({
            "update_id": 1,
            "callback_query": {"id": "cb1", "data": "tok-123", "message": {"chat": {"id": 1}}}
        });
        let c = classify(&raw);
        assert_eq!(
            c,
            Classification::Callback {
                chat_id: 1,
                user_id: None,
                callback_query_id: "cb1".to_string(),
                data: "tok-123".to_string(),
            }
        );
    }

    #[test]
    fn rewrites_a_natural_language_youtube_request_into_a_command() {
        let raw = json!({"update_id": 1, "message": {"chat": {"id": 1}, "text": "search youtube for lofi beats"}});
        let c = classify(&raw);
        assert_eq!(
            c,
            Classification::Command {
                chat_id: 1,
                user_id: None,
                name: "youtube".to_string(),
                args: "lofi beats".to_string(),
            }
        );
    }

    #[test]
    fn unrecognised_shape_is_non_actionable() {
        let raw = json!({"update_id": 1, "poll": {}});
        assert_eq!(classify(&raw), Classification::NonActionable);
    }
}
