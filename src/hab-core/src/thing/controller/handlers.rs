// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Command validation performed before a command reaches the device.

use crate::{ChannelId, Command, ThingInfo};

/// Result of command validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// Command can be sent.
    Ok,
    /// Thing has no channel with this id.
    UnknownChannel(ChannelId),
    /// Channel does not accept commands.
    ReadOnly(ChannelId),
    /// Command type does not fit the channel's item type.
    Unsupported(String),
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Message for a rejected command, `None` when valid.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Ok => None,
            Self::UnknownChannel(id) => Some(format!("unknown channel '{}'", id)),
            Self::ReadOnly(id) => Some(format!("channel '{}' is read-only", id)),
            Self::Unsupported(msg) => Some(msg.clone()),
        }
    }
}

/// Check a command against the thing's channel definitions.
///
/// `Refresh` is accepted on every known channel, read-only or not.
pub fn validate_command(info: &ThingInfo, channel: &ChannelId, command: &Command) -> ValidationResult {
    let Some(def) = info.channel(channel) else {
        return ValidationResult::UnknownChannel(channel.clone());
    };
    if matches!(command, Command::Refresh) {
        return ValidationResult::Ok;
    }
    if !def.writable {
        return ValidationResult::ReadOnly(channel.clone());
    }
    if !def.item_type.accepts(command) {
        return ValidationResult::Unsupported(format!(
            "command '{}' is not valid for {:?} channel '{}'",
            command, def.item_type, channel
        ));
    }
    ValidationResult::Ok
}
