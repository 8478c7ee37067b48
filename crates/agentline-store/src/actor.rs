// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Single-writer actor owning the sqlite connection. All store operations
//! are plain synchronous closures dispatched onto this one task, giving
//! the "row-level locking" spec §4.1 asks for as serialized access through
//! one task rather than OS-level file locks — consistent with SQLite's
//! single-writer model. Grounded on `sven-node/src/control/service.rs`'s
//! `ControlService`, a single actor owning all mutable state.

use std::any::Any;

use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

type BoxedAny = Box<dyn Any + Send>;
type Job = Box<dyn FnOnce(&Connection) -> BoxedAny + Send>;

pub struct Command {
    job: Job,
    reply: oneshot::Sender<BoxedAny>,
}

#[derive(Clone)]
pub struct ActorHandle {
    tx: mpsc::Sender<Command>,
}

impl ActorHandle {
    pub fn spawn(conn: Connection) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(256);
        std::thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                let result = (cmd.job)(&conn);
                let _ = cmd.reply.send(result);
            }
        });
        Self { tx }
    }

    /// Run `f` against the connection on the actor thread and return its result.
    pub async fn call<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Connection) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| Box::new(f(conn)) as BoxedAny);
        self.tx
            .send(Command { job, reply: reply_tx })
            .await
            .expect("store actor thread is gone");
        let boxed = reply_rx.await.expect("store actor dropped reply");
        *boxed.downcast::<R>().expect("store actor reply type mismatch")
    }
}
