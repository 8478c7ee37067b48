// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Which subsystems this process starts for each configured bot.
///
/// Bots with `runtime_mode: embedded` always get workers wired locally
/// under `Role::All`; bots with `runtime_mode: gateway` are expected to
/// have their workers run in a separately launched `--role workers`
/// instance sharing the same database (spec.md's gateway split is the
/// supervisor's job, out of scope here — this flag is the local stand-in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    All,
    Ingress,
    Workers,
}

/// agentline — bridges a Telegram chat to a CLI coding agent.
#[derive(Parser, Debug)]
#[command(name = "agentline", version, about)]
pub struct Cli {
    /// Explicit bots.yaml path, applied on top of the usual search path.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Address the shared HTTP surface (webhook + health/metrics) binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Which subsystems to start for every configured bot.
    #[arg(long, value_enum, default_value = "all")]
    pub role: Role,

    /// Print shell completions for the given shell and exit.
    #[arg(long, value_enum)]
    pub completions: Option<clap_complete::Shell>,
}

pub fn print_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
