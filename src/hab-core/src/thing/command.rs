// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use crate::{ChannelId, Command, DeviceConfig};

/// Internal command handled by the thing task.
#[derive(Debug, Clone)]
pub enum ThingCommand {
    GetSnapshot,
    SendCommand { channel: ChannelId, command: Command },
    /// Poll the device now, outside the regular schedule.
    Refresh,
    /// Dispose the driver and initialize again with new parameters.
    Reconfigure(DeviceConfig),
}
