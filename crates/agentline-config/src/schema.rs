// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// Used for config fields that should be enabled unless the user explicitly
/// sets them to `false`.  `#[serde(default)]` on a `bool` always falls back
/// to `bool::default()` (i.e. `false`), so a named function is required.
fn default_true() -> bool {
    true
}

fn default_runtime_mode() -> RuntimeMode {
    RuntimeMode::Embedded
}

/// Top-level bot-list file (`bots.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotsFile {
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

/// One bot instance (spec.md §3 `Bot` entity, as configured at load time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Stable identifier used as `bot_id` throughout the store.
    pub bot_id: String,
    /// Human-readable display name.
    #[serde(default)]
    pub display_name: String,
    /// `embedded` (this process hosts ingress + workers) or `gateway`
    /// (ingress lives in a shared process, workers run separately).
    /// Spawning the separate gateway process is the supervisor's job
    /// (out of scope) — this field only changes which subsystems this
    /// process starts for the bot.
    #[serde(default = "default_runtime_mode")]
    pub runtime_mode: RuntimeMode,
    /// Owner identity gate (spec.md §4.3 step 2). `None` disables the gate.
    pub owner_id: Option<String>,
    /// Default agent name used for new sessions.
    pub default_agent: String,
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Per-agent model/sandbox options, keyed by agent name.
    #[serde(default)]
    pub agents: HashMap<String, AgentOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Embedded,
    Gateway,
}

/// Webhook ingest settings for one bot.
///
/// `path_secret` and `header_secret` may each be given either as a literal
/// string or as `{ env: "VAR_NAME" }`, in which case the value is
/// substituted from the named environment variable at load time — this
/// keeps tokens out of the committed YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub public_url: Option<String>,
    pub path_secret: Option<EnvOrLiteral>,
    pub header_secret: Option<EnvOrLiteral>,
}

/// Per-agent options: model name and sandbox toggles for one adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOptions {
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub sandboxed: bool,
}

/// A config value that is either a literal string, or a reference to an
/// environment variable whose value is substituted at load time.
///
/// ```yaml
/// path_secret: "literal-secret"
/// # or
/// header_secret:
///   env: TELEGRAM_HEADER_SECRET
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvOrLiteral {
    Literal(String),
    EnvRef { env: String },
}

impl EnvOrLiteral {
    /// Resolve to its final string value, reading the environment when this
    /// is an `EnvRef`. Returns `None` if the referenced variable is unset.
    pub fn resolve(&self) -> Option<String> {
        match self {
            EnvOrLiteral::Literal(s) => Some(s.clone()),
            EnvOrLiteral::EnvRef { env } => std::env::var(env).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_webhook_secret_parses() {
        let yaml = "path_secret: abc123\n";
        let cfg: WebhookConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            cfg.path_secret.unwrap().resolve().as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn env_ref_webhook_secret_resolves_from_environment() {
        std::env::set_var("AGENTLINE_TEST_SECRET_XYZ", "from-env");
        let yaml = "header_secret:\n  env: AGENTLINE_TEST_SECRET_XYZ\n";
        let cfg: WebhookConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            cfg.header_secret.unwrap().resolve().as_deref(),
            Some("from-env")
        );
    }

    #[test]
    fn env_ref_missing_variable_resolves_to_none() {
        let yaml = "header_secret:\n  env: AGENTLINE_DOES_NOT_EXIST_ABC\n";
        let cfg: WebhookConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.header_secret.unwrap().resolve().is_none());
    }

    #[test]
    fn bot_config_minimal_round_trip() {
        let yaml = "bot_id: demo\ndefault_agent: claude\n";
        let bot: BotConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(bot.bot_id, "demo");
        assert_eq!(bot.runtime_mode, RuntimeMode::Embedded);
        assert!(bot.owner_id.is_none());
    }

    #[test]
    fn bots_file_parses_multiple_bots() {
        let yaml = "bots:\n  - bot_id: a\n    default_agent: x\n  - bot_id: b\n    default_agent: y\n";
        let file: BotsFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.bots.len(), 2);
        assert_eq!(file.bots[0].bot_id, "a");
        assert_eq!(file.bots[1].bot_id, "b");
    }
}
