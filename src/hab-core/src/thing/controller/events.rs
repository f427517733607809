// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thing event notification system.
//!
//! Listeners receive channel updates and status transitions from the thing
//! task that owns a device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{ChannelId, State};

use super::machine::StatusInfo;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Trait for components that want to receive thing events.
///
/// All methods have default no-op implementations.
pub trait ThingListener: Send + Sync {
    /// Called when a channel value changed.
    fn on_channel_update(&self, _uid: &str, _channel: &ChannelId, _old: Option<&State>, _new: &State) {}

    /// Called when the thing status transitions.
    fn on_status_change(&self, _uid: &str, _old: &StatusInfo, _new: &StatusInfo) {}
}

/// Manages registered listeners and dispatches events.
#[derive(Default)]
pub struct ThingEventEmitter {
    listeners: Vec<(ListenerId, Arc<dyn ThingListener>)>,
}

impl ThingEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns an ID that can be used to unregister it.
    pub fn register(&mut self, listener: Arc<dyn ThingListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.push((id, listener));
        id
    }

    pub fn unregister(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn notify_channel_update(&self, uid: &str, channel: &ChannelId, old: Option<&State>, new: &State) {
        for (_, listener) in &self.listeners {
            listener.on_channel_update(uid, channel, old, new);
        }
    }

    pub fn notify_status_change(&self, uid: &str, old: &StatusInfo, new: &StatusInfo) {
        for (_, listener) in &self.listeners {
            listener.on_status_change(uid, old, new);
        }
    }
}
