// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Channel mappings declared in device configuration.
//!
//! ```toml
//! "channel.temperature" = "/sensors/0/value"
//! "type.temperature" = "number"
//! "unit.temperature" = "°C"
//! "writable.power" = true
//! "property.firmware" = "/info/fw"
//! ```

use hab_core::{ChannelDef, ChannelId, DeviceConfig, DriverError, DriverResult, ItemType};

pub const CHANNEL_PREFIX: &str = "channel.";
pub const TYPE_PREFIX: &str = "type.";
pub const UNIT_PREFIX: &str = "unit.";
pub const WRITABLE_PREFIX: &str = "writable.";
pub const PROPERTY_PREFIX: &str = "property.";

/// A channel definition plus where its value comes from in a device reply.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedChannel {
    pub def: ChannelDef,
    /// JSON pointer or reply key, depending on the driver.
    pub source: String,
}

/// Read all `channel.<id>` mappings. Channels without a `type.<id>` entry
/// are numbers.
pub fn channels_from_config(config: &DeviceConfig) -> DriverResult<Vec<MappedChannel>> {
    let mut channels = Vec::new();
    for (id, source) in config.with_prefix(CHANNEL_PREFIX) {
        let source = source.to_string();
        if source.trim().is_empty() {
            return Err(DriverError::configuration(format!(
                "channel '{}' has an empty source",
                id
            )));
        }
        let item_type = match config.optional_str(&format!("{}{}", TYPE_PREFIX, id))? {
            Some(raw) => ItemType::parse(&raw).ok_or_else(|| {
                DriverError::configuration(format!("channel '{}' has unknown type '{}'", id, raw))
            })?,
            None => ItemType::Number,
        };
        let writable = config
            .optional_bool(&format!("{}{}", WRITABLE_PREFIX, id))?
            .unwrap_or(false);
        let unit = config.optional_str(&format!("{}{}", UNIT_PREFIX, id))?;

        let mut def = if writable {
            ChannelDef::writable(ChannelId::from(id), item_type)
        } else {
            ChannelDef::read_only(ChannelId::from(id), item_type)
        };
        if let Some(unit) = unit.filter(|u| !u.is_empty()) {
            def = def.with_unit(unit);
        }
        channels.push(MappedChannel { def, source });
    }
    if channels.is_empty() {
        return Err(DriverError::configuration(
            "at least one 'channel.<id>' mapping is required",
        ));
    }
    Ok(channels)
}

/// Read all `property.<name>` mappings as `(name, source)` pairs.
pub fn properties_from_config(config: &DeviceConfig) -> DriverResult<Vec<(String, String)>> {
    config
        .with_prefix(PROPERTY_PREFIX)
        .map(|(name, source)| {
            let source = source.to_string();
            if source.trim().is_empty() {
                return Err(DriverError::configuration(format!(
                    "property '{}' has an empty source",
                    name
                )));
            }
            Ok((name.to_string(), source))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_from_config() {
        let cfg = DeviceConfig::new()
            .with("channel.power", "/on")
            .with("type.power", "switch")
            .with("writable.power", true)
            .with("channel.temp", "/temp")
            .with("unit.temp", "°C");
        let channels = channels_from_config(&cfg).unwrap();
        assert_eq!(channels.len(), 2);

        let power = channels.iter().find(|c| c.def.id.as_str() == "power").unwrap();
        assert_eq!(power.def.item_type, ItemType::Switch);
        assert!(power.def.writable);
        assert_eq!(power.source, "/on");

        let temp = channels.iter().find(|c| c.def.id.as_str() == "temp").unwrap();
        assert_eq!(temp.def.item_type, ItemType::Number);
        assert!(!temp.def.writable);
        assert_eq!(temp.def.unit.as_deref(), Some("°C"));
    }

    #[test]
    fn test_properties_from_config() {
        let cfg = DeviceConfig::new()
            .with("channel.power", "/on")
            .with("property.firmware", "/info/fw")
            .with("property.serial", "sn");
        assert_eq!(
            properties_from_config(&cfg).unwrap(),
            vec![
                ("firmware".to_string(), "/info/fw".to_string()),
                ("serial".to_string(), "sn".to_string()),
            ]
        );
        let empty = DeviceConfig::new().with("property.serial", " ");
        assert!(properties_from_config(&empty).is_err());
    }

    #[test]
    fn test_no_channels_rejected() {
        let err = channels_from_config(&DeviceConfig::new().with("host", "x")).unwrap_err();
        assert!(matches!(err, DriverError::Configuration(_)));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let cfg = DeviceConfig::new()
            .with("channel.x", "/x")
            .with("type.x", "colour");
        assert!(channels_from_config(&cfg).is_err());
    }
}
