// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thin handle giving the listener access to one thing's task and snapshot.

use tokio::sync::{mpsc, watch};

use hab_core::{ThingRequest, ThingSnapshot};

/// A handle to a single running thing task.
///
/// One `ThingHandle` is created per `[[things]]` entry in `main.rs` and
/// stored in the shared `Arc<HashMap<String, ThingHandle>>` passed to the
/// listener.
pub struct ThingHandle {
    /// Thing UID, matches the key in the HashMap.
    pub uid: String,
    /// Send requests to the thing task.
    pub tx: mpsc::Sender<ThingRequest>,
    /// Latest published snapshot, for fast reads.
    pub snapshot_rx: watch::Receiver<ThingSnapshot>,
}

impl ThingHandle {
    pub fn snapshot(&self) -> ThingSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}
