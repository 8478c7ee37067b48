// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Process-wide defaults sourced from the environment rather than the
//! bot-list YAML. These apply to every bot hosted by this process and are
//! not expected to differ between bots (database location, lease/poll
//! timings, log verbosity).

const DEFAULT_DATABASE_PATH: &str = "agentline.db";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LEASE_TTL_MS: u64 = 60_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_RUN_TIMEOUT_MS: u64 = 15 * 60_000;

/// Global defaults read once at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Path to the sqlite database file backing `agentline-store`.
    pub database_path: String,
    /// `tracing_subscriber::EnvFilter` directive string.
    pub log_level: String,
    /// How long a worker holds a lease before another worker may reclaim it.
    pub lease_ttl_ms: u64,
    /// Idle poll interval for update/run worker loops when no job is ready.
    pub poll_interval_ms: u64,
    /// Maximum wall-clock duration of a single run before it is force-failed.
    pub run_timeout_ms: u64,
    /// Base URL used to build Telegram Bot API requests; override for
    /// testing against a local stub server.
    pub platform_base_url: Option<String>,
}

impl GlobalConfig {
    /// Build from the process environment, falling back to defaults for any
    /// variable that is unset or fails to parse.
    pub fn from_env() -> Self {
        Self {
            database_path: env_string("AGENTLINE_DATABASE_PATH", DEFAULT_DATABASE_PATH),
            log_level: env_string("AGENTLINE_LOG_LEVEL", DEFAULT_LOG_LEVEL),
            lease_ttl_ms: env_u64("AGENTLINE_LEASE_TTL_MS", DEFAULT_LEASE_TTL_MS),
            poll_interval_ms: env_u64("AGENTLINE_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            run_timeout_ms: env_u64("AGENTLINE_RUN_TIMEOUT_MS", DEFAULT_RUN_TIMEOUT_MS),
            platform_base_url: std::env::var("AGENTLINE_PLATFORM_BASE_URL").ok(),
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            lease_ttl_ms: DEFAULT_LEASE_TTL_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            platform_base_url: None,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that mutate process-wide env vars.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("AGENTLINE_DATABASE_PATH");
        std::env::remove_var("AGENTLINE_LEASE_TTL_MS");
        let cfg = GlobalConfig::from_env();
        assert_eq!(cfg.database_path, DEFAULT_DATABASE_PATH);
        assert_eq!(cfg.lease_ttl_ms, DEFAULT_LEASE_TTL_MS);
        assert!(cfg.platform_base_url.is_none());
    }

    #[test]
    fn reads_overrides_from_environment() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("AGENTLINE_DATABASE_PATH", "/tmp/custom.db");
        std::env::set_var("AGENTLINE_LEASE_TTL_MS", "5000");
        let cfg = GlobalConfig::from_env();
        assert_eq!(cfg.database_path, "/tmp/custom.db");
        assert_eq!(cfg.lease_ttl_ms, 5000);
        std::env::remove_var("AGENTLINE_DATABASE_PATH");
        std::env::remove_var("AGENTLINE_LEASE_TTL_MS");
    }

    #[test]
    fn malformed_numeric_override_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("AGENTLINE_POLL_INTERVAL_MS", "not-a-number");
        let cfg = GlobalConfig::from_env();
        assert_eq!(cfg.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        std::env::remove_var("AGENTLINE_POLL_INTERVAL_MS");
    }
}
