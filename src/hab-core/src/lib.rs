// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod thing;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use thing::channel::{ChannelId, Command, ItemType, State};
pub use thing::command::ThingCommand;
pub use thing::config::{DeviceConfig, ParamValue};
pub use thing::controller::{StatusDetail, StatusInfo, ThingStatus};
pub use thing::error::{DriverError, DriverResult, ErrorKind, RequestError, RequestResult};
pub use thing::request::ThingRequest;
pub use thing::state::{ChannelChange, ChannelSnapshot, DeviceState, ThingSnapshot};
pub use thing::{ChannelDef, ChannelUpdate, Device, DeviceDriver, Payload, ThingInfo};
