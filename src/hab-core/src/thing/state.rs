// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::thing::controller::StatusInfo;
use crate::{ChannelDef, ChannelId, ChannelUpdate, State};

/// Last-known channel values held by the thing task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    values: BTreeMap<ChannelId, State>,
}

/// One channel whose value changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelChange {
    pub channel: ChannelId,
    pub old: Option<State>,
    pub new: State,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: &ChannelId) -> Option<&State> {
        self.values.get(channel)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Store updates and return the ones that changed a value.
    pub fn apply(&mut self, updates: Vec<ChannelUpdate>) -> Vec<ChannelChange> {
        let mut changes = Vec::new();
        for update in updates {
            let old = self.values.get(&update.channel).cloned();
            if old.as_ref() == Some(&update.state) {
                continue;
            }
            self.values.insert(update.channel.clone(), update.state.clone());
            changes.push(ChannelChange {
                channel: update.channel,
                old,
                new: update.state,
            });
        }
        changes
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Channel definition together with its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    #[serde(flatten)]
    pub def: ChannelDef,
    pub state: State,
}

/// Read-only view of a thing, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingSnapshot {
    pub uid: String,
    pub thing_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub status: StatusInfo,
    pub channels: Vec<ChannelSnapshot>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub poll_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll_ok: Option<bool>,
}

impl ThingSnapshot {
    pub fn channel(&self, id: &str) -> Option<&ChannelSnapshot> {
        self.channels.iter().find(|c| c.def.id.as_str() == id)
    }

    /// Current value of a channel, `None` if the thing has no such channel.
    pub fn state(&self, id: &str) -> Option<&State> {
        self.channel(id).map(|c| &c.state)
    }
}
