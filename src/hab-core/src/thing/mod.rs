// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{ChannelId, Command, DriverResult, ItemType, State};

/// Alias to reduce type complexity in DeviceDriver.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = DriverResult<T>> + Send + 'a>>;

pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod request;
pub mod state;

/// Static description of one channel exposed by a thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDef {
    pub id: ChannelId,
    pub item_type: ItemType,
    /// Channel accepts commands from the host.
    pub writable: bool,
    /// Unit attached to numeric readings, e.g. "°C" or "W".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ChannelDef {
    pub fn read_only(id: impl Into<ChannelId>, item_type: ItemType) -> Self {
        Self {
            id: id.into(),
            item_type,
            writable: false,
            unit: None,
        }
    }

    pub fn writable(id: impl Into<ChannelId>, item_type: ItemType) -> Self {
        Self {
            writable: true,
            ..Self::read_only(id, item_type)
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Static info describing a configured thing and the driver behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingInfo {
    pub thing_type: String,
    pub vendor: String,
    pub model: String,
    pub channels: Vec<ChannelDef>,
    /// Free-form device properties (firmware, serial number, ...).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ThingInfo {
    pub fn channel(&self, id: &ChannelId) -> Option<&ChannelDef> {
        self.channels.iter().find(|c| &c.id == id)
    }
}

/// A single channel value produced by a poll or a command acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    pub channel: ChannelId,
    pub state: State,
}

impl ChannelUpdate {
    pub fn new(channel: impl Into<ChannelId>, state: State) -> Self {
        Self {
            channel: channel.into(),
            state,
        }
    }
}

/// Raw status payload returned by a poll, before parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

/// Common interface for device drivers.
pub trait Device {
    fn info(&self) -> &ThingInfo;
}

/// Protocol operations every device driver implements.
///
/// A driver is owned by exactly one thing task, so a poll and a command are
/// never in flight at the same time for one device.
pub trait DeviceDriver: Device + Send {
    /// Issue one status request to the device.
    fn poll<'a>(&'a mut self) -> DriverFuture<'a, Payload>;

    /// Turn a status payload into channel values.
    fn parse_response(&self, payload: &Payload) -> DriverResult<Vec<ChannelUpdate>>;

    /// Device properties carried by a status payload (firmware, serial
    /// number, ...). They override the static `ThingInfo` properties.
    fn parse_properties(&self, _payload: &Payload) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Send one command to the device. Returns any values the device
    /// acknowledged as a result.
    fn send_command<'a>(
        &'a mut self,
        channel: &'a ChannelId,
        command: &'a Command,
    ) -> DriverFuture<'a, Vec<ChannelUpdate>>;

    /// Release connections held by the driver.
    fn dispose<'a>(&'a mut self) -> DriverFuture<'a, ()> {
        Box::pin(std::future::ready(Ok(())))
    }
}
