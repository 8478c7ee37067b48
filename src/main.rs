// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! agentline: a per-process supervisor that wires up, for every configured
//! bot, the ingress entry point (webhook route or long-poller), the
//! UpdateWorker/RunWorker lease loops, and the shared `/healthz`,
//! `/readyz`, `/metrics` HTTP surface — then runs until asked to stop.

mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agentline_adapter::{Adapter, ProcessAdapter};
use agentline_config::{BotConfig, GlobalConfig, RuntimeMode};
use agentline_ingress::{router, BotIngressConfig, IngressState, Poller};
use agentline_platform::{MockPlatform, PlatformClient, TelegramClient};
use agentline_run::RunWorker;
use agentline_store::Store;
use agentline_worker::{UpdateWorker, YoutubeSearchHelper};

use cli::{Cli, Role};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        cli::print_completions(shell);
        return Ok(());
    }

    let global = GlobalConfig::from_env();
    init_logging(&global.log_level);

    let bots_file = agentline_config::load_bots(cli.config.as_deref())?;
    if bots_file.bots.is_empty() {
        warn!("no bots configured; nothing to do");
    }

    let store = Store::open(&global.database_path)?;

    let mut ingress_bots = Vec::new();
    let mut pollers: Vec<Poller> = Vec::new();

    for bot in &bots_file.bots {
        let platform = build_platform(bot, &global);
        let adapters = build_adapters(bot);

        let wires_workers = matches!(cli.role, Role::All | Role::Workers)
            && (bot.runtime_mode == RuntimeMode::Embedded || cli.role == Role::Workers);
        let wires_ingress = matches!(cli.role, Role::All | Role::Ingress);

        if wires_workers {
            spawn_update_worker(bot, store.clone(), platform.clone(), &global);
            spawn_run_worker(bot, store.clone(), platform.clone(), adapters, &global);
        } else if matches!(cli.role, Role::All) {
            info!(
                bot_id = %bot.bot_id,
                "gateway-mode bot: workers are not started here, run a separate --role workers instance"
            );
        }

        if !wires_ingress {
            continue;
        }

        match bot.webhook.path_secret.as_ref().and_then(|s| s.resolve()) {
            Some(path_secret) => {
                let header_secret = bot.webhook.header_secret.as_ref().and_then(|s| s.resolve());
                ingress_bots.push(BotIngressConfig { bot_id: bot.bot_id.clone(), path_secret, header_secret });
            }
            None => {
                let Some(token) = bot_token(&bot.bot_id) else {
                    warn!(bot_id = %bot.bot_id, "no webhook secret and no bot token configured; skipping ingress");
                    continue;
                };
                let local_mode = global
                    .platform_base_url
                    .as_deref()
                    .map(|u| u.contains("127.0.0.1") || u.contains("localhost"))
                    .unwrap_or(false);
                let raw_bot = teloxide::Bot::new(token);
                pollers.push(Poller::new(raw_bot, bot.bot_id.clone(), store.clone(), local_mode));
            }
        }
    }

    for poller in pollers {
        tokio::spawn(async move { poller.run().await });
    }

    let state = IngressState::new(store, ingress_bots);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(cli.bind.as_str()).await?;
    info!(bind = %cli.bind, "agentline listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

fn build_platform(bot: &BotConfig, _global: &GlobalConfig) -> Arc<dyn PlatformClient> {
    match bot_token(&bot.bot_id) {
        Some(token) => Arc::new(TelegramClient::new(token)),
        None => {
            warn!(bot_id = %bot.bot_id, "no bot token configured, using in-memory mock platform");
            Arc::new(MockPlatform::new())
        }
    }
}

/// Per-bot Telegram token convention: `AGENTLINE_BOT_<BOT_ID>_TOKEN`, with
/// `bot_id` upper-cased and non-alphanumeric characters replaced by `_`.
/// `BotConfig` deliberately carries no token field (spec §3, tokens stay
/// out of the committed YAML) so this is the only place one is read.
fn bot_token(bot_id: &str) -> Option<String> {
    let suffix: String = bot_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    std::env::var(format!("AGENTLINE_BOT_{suffix}_TOKEN")).ok()
}

fn build_adapters(bot: &BotConfig) -> HashMap<String, Arc<dyn Adapter>> {
    let mut names: Vec<&String> = bot.agents.keys().collect();
    if !bot.agents.contains_key(&bot.default_agent) {
        names.push(&bot.default_agent);
    }
    names
        .into_iter()
        .map(|name| {
            let adapter: Arc<dyn Adapter> = Arc::new(ProcessAdapter::new(name.clone(), name.clone()));
            (name.clone(), adapter)
        })
        .collect()
}

fn spawn_update_worker(
    bot: &BotConfig,
    store: Store,
    platform: Arc<dyn PlatformClient>,
    global: &GlobalConfig,
) {
    let search = Arc::new(YoutubeSearchHelper::new());
    let worker = UpdateWorker::new(bot, store, platform, search)
        .with_lease_ttl_ms(global.lease_ttl_ms as i64)
        .with_poll_interval(std::time::Duration::from_millis(global.poll_interval_ms));
    tokio::spawn(async move { worker.run().await });
}

fn spawn_run_worker(
    bot: &BotConfig,
    store: Store,
    platform: Arc<dyn PlatformClient>,
    adapters: HashMap<String, Arc<dyn Adapter>>,
    global: &GlobalConfig,
) {
    let worker = RunWorker::new(bot, store, platform, adapters)
        .with_lease_ttl_ms(global.lease_ttl_ms as i64)
        .with_poll_interval(std::time::Duration::from_millis(global.poll_interval_ms))
        .with_run_timeout(std::time::Duration::from_millis(global.run_timeout_ms));
    tokio::spawn(async move { worker.run().await });
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received, draining in-flight requests");
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
