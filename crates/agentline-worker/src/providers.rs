// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! `/providers` (spec §4.4 + SPEC_FULL.md supplement): installation status
//! of every configured adapter binary plus its default model.

use std::collections::HashMap;

use agentline_adapter::binary_on_path;
use agentline_config::AgentOptions;

#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub name: String,
    pub installed: bool,
    pub default_model: Option<String>,
}

pub fn provider_statuses(agents: &HashMap<String, AgentOptions>) -> Vec<ProviderStatus> {
    let mut names: Vec<&String> = agents.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| {
            let opts = &agents[name];
            ProviderStatus {
                name: name.clone(),
                installed: binary_on_path(name),
                default_model: opts.model.clone(),
            }
        })
        .collect()
}

pub fn format_providers_reply(statuses: &[ProviderStatus]) -> String {
    if statuses.is_empty() {
        return "no agents configured".to_string();
    }
    let mut lines = vec!["known agents:".to_string()];
    for s in statuses {
        let status = if s.installed { "installed" } else { "missing" };
        let model = s.default_model.as_deref().unwrap_or("default");
        lines.push(format!("- {} [{status}] model={model}", s.name));
    }
    lines.join("\n")
}
