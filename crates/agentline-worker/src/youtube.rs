// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! `/youtube <q>` / `/yt <q>` (spec §4.4). A deterministic search-and-pick
//! helper behind a trait, the same seam the teacher uses for
//! `ModelProvider`/`ToolRegistry` — tests substitute a fixed-answer fake so
//! no network call happens under test.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("no results found")]
    NoResults,
    #[error("search request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait SearchHelper: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, SearchError>;
}

/// Production helper: one GET against the YouTube search results page,
/// takes the first `/watch?v=` link found in the response body.
pub struct YoutubeSearchHelper {
    client: reqwest::Client,
    base_url: String,
}

impl YoutubeSearchHelper {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://www.youtube.com/results".to_string(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for YoutubeSearchHelper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchHelper for YoutubeSearchHelper {
    async fn search(&self, query: &str) -> Result<String, SearchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("search_query", query)])
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;
        extract_first_watch_url(&body).ok_or(SearchError::NoResults)
    }
}

fn watch_id_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r#""/watch\?v=([A-Za-z0-9_-]{6,})""#).expect("static pattern"))
}

fn extract_first_watch_url(body: &str) -> Option<String> {
    watch_id_pattern()
        .captures(body)
        .map(|c| format!("https://www.youtube.com/watch?v={}", &c[1]))
}

/// Deterministic test double: always returns a fixed URL, never touches
/// the network.
pub struct FixedAnswerSearchHelper {
    pub url: String,
}

impl FixedAnswerSearchHelper {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SearchHelper for FixedAnswerSearchHelper {
    async fn search(&self, _query: &str) -> Result<String, SearchError> {
        Ok(self.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_the_first_watch_url_from_a_results_page() {
        let body = r#"garbage ... "/watch?v=dQw4w9WgXcQ" more garbage "/watch?v=other1""#;
        assert_eq!(
            extract_first_watch_url(body).as_deref(),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(extract_first_watch_url("nothing here"), None);
    }

    #[tokio::test]
    async fn fixed_answer_helper_always_returns_the_configured_url() {
        let helper = FixedAnswerSearchHelper::new("https://www.youtube.com/watch?v=abc123");
        let url = helper.search("anything").await.unwrap();
        assert_eq!(url, "https://www.youtube.com/watch?v=abc123");
    }
}
