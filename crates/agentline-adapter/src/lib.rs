// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod mock;
mod path;
mod process;

pub use mock::MockAdapter;
pub use path::binary_on_path;
pub use process::ProcessAdapter;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use agentline_core::AdapterEvent;

/// Resumable agent-thread context passed into a run (spec §6).
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub agent_thread_id: Option<String>,
}

/// `(input, session_context) -> lazy finite sequence of typed events`
/// (spec §6, §9). Implementations push events onto `tx` as they become
/// available and return once a terminal event has been sent or `cancel`
/// resolves, mirroring the teacher's `Agent::submit_with_cancel` shape
/// (`mpsc::Sender<Event>` + `oneshot::Receiver<()>`).
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Name this adapter is registered under (matches `Session::current_agent`).
    fn name(&self) -> &str;

    async fn run(
        &self,
        input: &str,
        ctx: SessionContext,
        tx: mpsc::Sender<AdapterEvent>,
        cancel: oneshot::Receiver<()>,
    );
}
