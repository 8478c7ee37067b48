// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! A small, fixed allow-list of Korean/English phrasings that mean "search
//! youtube for X" (SPEC_FULL.md supplement), rewritten to `/youtube <q>`
//! before classification. Not a general NLU model — matching the original's
//! own allow-listed phrase table.

use std::sync::OnceLock;

use regex::Regex;

fn patterns() -> &'static Vec<Regex> {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        [
            r"(?i)^유튜브\s*(?P<q>.+?)\s*찾아\s*줘$",
            r"(?i)^유튜브에서\s*(?P<q>.+?)\s*찾아\s*줘$",
            r"(?i)^find me a youtube video(?: (?:of|about|for))?\s+(?P<q>.+)$",
            r"(?i)^search youtube for\s+(?P<q>.+)$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Returns `Some("/youtube <query>")` for a recognised phrasing, `None`
/// otherwise.
pub fn rewrite_nl_youtube_intent(text: &str) -> Option<String> {
    let trimmed = text.trim();
    for re in patterns() {
        if let Some(caps) = re.captures(trimmed) {
            let query = caps.name("q")?.as_str().trim();
            if !query.is_empty() {
                return Some(format!("/youtube {query}"));
            }
        }
    }
    None
}
