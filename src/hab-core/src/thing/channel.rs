// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Channel identifiers, channel values and inbound commands.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a channel within one thing, e.g. `power` or `temperature`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Kind of value a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Switch,
    Number,
    String,
}

impl ItemType {
    /// Parse an item type name as written in device configuration.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "switch" | "onoff" | "bool" => Some(Self::Switch),
            "number" | "decimal" | "quantity" => Some(Self::Number),
            "string" | "text" => Some(Self::String),
            _ => None,
        }
    }

    /// Reinterpret a loosely parsed command for this item type.
    ///
    /// `"off"` sent to a text channel stays the text `off`, and `1`/`0`
    /// sent to a switch become ON/OFF. Anything else is returned unchanged.
    pub fn coerce(&self, command: Command) -> Command {
        match (self, command) {
            (Self::String, Command::OnOff(b)) => Command::Text(if b { "on" } else { "off" }.to_string()),
            (Self::String, Command::Decimal(v)) => Command::Text(v.to_string()),
            (Self::String, Command::Quantity { value, unit }) => {
                Command::Text(format!("{} {}", value, unit))
            }
            (Self::Switch, Command::Decimal(v)) if v == 1.0 || v == 0.0 => Command::OnOff(v == 1.0),
            (_, cmd) => cmd,
        }
    }

    /// Check whether a command can be delivered to a channel of this type.
    pub fn accepts(&self, command: &Command) -> bool {
        match (self, command) {
            (_, Command::Refresh) => true,
            (Self::Switch, Command::OnOff(_)) => true,
            (Self::Number, Command::Decimal(_) | Command::Quantity { .. }) => true,
            (Self::String, Command::Text(_)) => true,
            _ => false,
        }
    }
}

/// Last-known value of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum State {
    OnOff(bool),
    Decimal(f64),
    Quantity { value: f64, unit: String },
    Text(String),
    Undef,
}

impl State {
    /// Convert a JSON value read from a device into a channel value.
    ///
    /// `null` becomes `Undef`; values that do not fit the item type are
    /// reported as `Err` with a description of the mismatch.
    pub fn from_json(value: &Value, item_type: ItemType, unit: Option<&str>) -> Result<Self, String> {
        match (item_type, value) {
            (_, Value::Null) => Ok(Self::Undef),
            (ItemType::Switch, Value::Bool(b)) => Ok(Self::OnOff(*b)),
            (ItemType::Switch, Value::Number(n)) => Ok(Self::OnOff(n.as_f64().unwrap_or(0.0) != 0.0)),
            (ItemType::Switch, Value::String(s)) => {
                parse_on_off(s).map(Self::OnOff).ok_or_else(|| format!("'{}' is not ON/OFF", s))
            }
            (ItemType::Number, Value::Number(n)) => n
                .as_f64()
                .map(|v| number_state(v, unit))
                .ok_or_else(|| format!("'{}' is not a finite number", n)),
            (ItemType::Number, Value::String(s)) => Self::parse(s, ItemType::Number, unit),
            (ItemType::String, Value::String(s)) => Ok(Self::Text(s.clone())),
            (ItemType::String, other) => Ok(Self::Text(other.to_string())),
            (ty, other) => Err(format!("cannot map {} to a {:?} channel", other, ty)),
        }
    }

    /// Parse a textual device reading into a channel value.
    pub fn parse(raw: &str, item_type: ItemType, unit: Option<&str>) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("undef") || raw.eq_ignore_ascii_case("null") {
            return Ok(Self::Undef);
        }
        match item_type {
            ItemType::Switch => parse_on_off(raw)
                .map(Self::OnOff)
                .ok_or_else(|| format!("'{}' is not ON/OFF", raw)),
            ItemType::Number => {
                if let Ok(v) = raw.parse::<f64>() {
                    return Ok(number_state(v, unit));
                }
                parse_quantity(raw)
                    .map(|(value, unit)| Self::Quantity { value, unit })
                    .ok_or_else(|| format!("'{}' is not a number", raw))
            }
            ItemType::String => Ok(Self::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnOff(true) => write!(f, "ON"),
            Self::OnOff(false) => write!(f, "OFF"),
            Self::Decimal(v) => write!(f, "{}", v),
            Self::Quantity { value, unit } => write!(f, "{} {}", value, unit),
            Self::Text(s) => write!(f, "{}", s),
            Self::Undef => write!(f, "UNDEF"),
        }
    }
}

/// Command delivered by the host to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Command {
    Refresh,
    OnOff(bool),
    Decimal(f64),
    Quantity { value: f64, unit: String },
    Text(String),
}

impl Command {
    /// Parse a command from the loose JSON form clients send.
    ///
    /// Accepts `true`/`false`, numbers, `"ON"`/`"OFF"`, `"REFRESH"`,
    /// `"21.5 °C"`, any other string as text, or the tagged form
    /// `{"type": "decimal", "value": 21.5}`.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(Self::OnOff(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Decimal)
                .ok_or_else(|| format!("'{}' is not a finite number", n)),
            Value::String(s) => Ok(Self::parse(s)),
            Value::Object(_) => serde_json::from_value(value.clone())
                .map_err(|e| format!("invalid command object: {}", e)),
            Value::Null | Value::Array(_) => Err(format!("unsupported command value: {}", value)),
        }
    }

    /// Parse a command from its textual form.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("refresh") {
            return Self::Refresh;
        }
        if let Some(b) = parse_on_off(raw) {
            if !raw.chars().all(|c| c.is_ascii_digit()) {
                return Self::OnOff(b);
            }
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Self::Decimal(v);
        }
        if let Some((value, unit)) = parse_quantity(raw) {
            return Self::Quantity { value, unit };
        }
        Self::Text(raw.to_string())
    }

    /// JSON form sent to REST devices.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Refresh => Value::Null,
            Self::OnOff(b) => Value::Bool(*b),
            Self::Decimal(v) | Self::Quantity { value: v, .. } => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Value a channel takes once the device accepted this command.
    pub fn as_state(&self) -> Option<State> {
        match self {
            Self::Refresh => None,
            Self::OnOff(b) => Some(State::OnOff(*b)),
            Self::Decimal(v) => Some(State::Decimal(*v)),
            Self::Quantity { value, unit } => Some(State::Quantity {
                value: *value,
                unit: unit.clone(),
            }),
            Self::Text(s) => Some(State::Text(s.clone())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refresh => write!(f, "REFRESH"),
            Self::OnOff(true) => write!(f, "ON"),
            Self::OnOff(false) => write!(f, "OFF"),
            Self::Decimal(v) => write!(f, "{}", v),
            // Devices take the bare magnitude; the unit is implied by the channel.
            Self::Quantity { value, .. } => write!(f, "{}", value),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

fn parse_on_off(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "ON" | "TRUE" | "1" => Some(true),
        "OFF" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

fn parse_quantity(raw: &str) -> Option<(f64, String)> {
    let (value, unit) = raw.trim().split_once(' ')?;
    let value = value.parse::<f64>().ok()?;
    let unit = unit.trim();
    if unit.is_empty() {
        return None;
    }
    Some((value, unit.to_string()))
}

fn number_state(value: f64, unit: Option<&str>) -> State {
    match unit {
        Some(unit) if !unit.is_empty() => State::Quantity {
            value,
            unit: unit.to_string(),
        },
        _ => State::Decimal(value),
    }
}
