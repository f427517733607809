// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-device connection parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::thing::error::{DriverError, DriverResult};

/// Refresh interval used when a device does not configure one.
pub const DEFAULT_REFRESH_SECS: i64 = 60;

/// Key holding the polling interval in seconds.
pub const REFRESH_KEY: &str = "refresh";

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Immutable key-value connection parameters of one device instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceConfig {
    params: BTreeMap<String, ParamValue>,
}

impl DeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and defaults.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn required_str(&self, key: &str) -> DriverResult<String> {
        match self.optional_str(key)? {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(DriverError::Configuration(format!(
                "missing required parameter '{}'",
                key
            ))),
        }
    }

    /// Text parameter. Numbers and booleans are rendered as text.
    pub fn optional_str(&self, key: &str) -> DriverResult<Option<String>> {
        Ok(self.params.get(key).map(|v| v.to_string()))
    }

    pub fn optional_i64(&self, key: &str) -> DriverResult<Option<i64>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(ParamValue::Int(i)) => Ok(Some(*i)),
            Some(ParamValue::Float(f)) if f.fract() == 0.0 => Ok(Some(*f as i64)),
            Some(ParamValue::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| invalid(key, "an integer", s)),
            Some(other) => Err(invalid(key, "an integer", &other.to_string())),
        }
    }

    pub fn optional_u64(&self, key: &str) -> DriverResult<Option<u64>> {
        match self.optional_i64(key)? {
            None => Ok(None),
            Some(v) => u64::try_from(v)
                .map(Some)
                .map_err(|_| invalid(key, "a non-negative integer", &v.to_string())),
        }
    }

    pub fn optional_u16(&self, key: &str) -> DriverResult<Option<u16>> {
        match self.optional_i64(key)? {
            None => Ok(None),
            Some(v) => u16::try_from(v)
                .map(Some)
                .map_err(|_| invalid(key, "a value in 0..=65535", &v.to_string())),
        }
    }

    pub fn optional_f64(&self, key: &str) -> DriverResult<Option<f64>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(ParamValue::Float(f)) => Ok(Some(*f)),
            Some(ParamValue::Int(i)) => Ok(Some(*i as f64)),
            Some(ParamValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| invalid(key, "a number", s)),
            Some(other) => Err(invalid(key, "a number", &other.to_string())),
        }
    }

    pub fn optional_bool(&self, key: &str) -> DriverResult<Option<bool>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(ParamValue::Bool(b)) => Ok(Some(*b)),
            Some(ParamValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => Ok(Some(true)),
                "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(invalid(key, "a boolean", s)),
            },
            Some(other) => Err(invalid(key, "a boolean", &other.to_string())),
        }
    }

    /// Polling interval from the `refresh` key.
    ///
    /// Returns `None` when polling is disabled (`refresh <= 0`).
    pub fn refresh_interval(&self) -> DriverResult<Option<Duration>> {
        let secs = self.optional_i64(REFRESH_KEY)?.unwrap_or(DEFAULT_REFRESH_SECS);
        if secs <= 0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_secs(secs as u64)))
    }

    /// All parameters whose key starts with `prefix`, with the prefix removed.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a ParamValue)> + 'a {
        self.params
            .iter()
            .filter_map(move |(k, v)| k.strip_prefix(prefix).map(|rest| (rest, v)))
            .filter(|(k, _)| !k.is_empty())
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.params {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            if is_secret(k) {
                write!(f, "{}=***", k)?;
            } else {
                write!(f, "{}={}", k, v)?;
            }
        }
        Ok(())
    }
}

fn is_secret(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("password") || key.contains("token") || key.contains("secret")
}

fn invalid(key: &str, expected: &str, got: &str) -> DriverError {
    DriverError::Configuration(format!(
        "parameter '{}' must be {}, got '{}'",
        key, expected, got
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_str_missing() {
        let cfg = DeviceConfig::new();
        let err = cfg.required_str("host").unwrap_err();
        assert!(matches!(err, DriverError::Configuration(ref m) if m.contains("host")));
    }

    #[test]
    fn test_required_str_blank_is_missing() {
        let cfg = DeviceConfig::new().with("host", "  ");
        assert!(cfg.required_str("host").is_err());
    }

    #[test]
    fn test_numeric_accessors_accept_text() {
        let cfg = DeviceConfig::new().with("port", "8080").with("timeout_ms", 1500i64);
        assert_eq!(cfg.optional_u16("port").unwrap(), Some(8080));
        assert_eq!(cfg.optional_u64("timeout_ms").unwrap(), Some(1500));
        assert_eq!(cfg.optional_u16("missing").unwrap(), None);
    }

    #[test]
    fn test_port_out_of_range() {
        let cfg = DeviceConfig::new().with("port", 70000i64);
        assert!(cfg.optional_u16("port").is_err());
    }

    #[test]
    fn test_refresh_interval() {
        assert_eq!(
            DeviceConfig::new().refresh_interval().unwrap(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            DeviceConfig::new().with("refresh", 10i64).refresh_interval().unwrap(),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            DeviceConfig::new().with("refresh", 0i64).refresh_interval().unwrap(),
            None
        );
        assert_eq!(
            DeviceConfig::new().with("refresh", -5i64).refresh_interval().unwrap(),
            None
        );
        assert!(DeviceConfig::new()
            .with("refresh", "soon")
            .refresh_interval()
            .is_err());
    }

    #[test]
    fn test_with_prefix() {
        let cfg = DeviceConfig::new()
            .with("channel.power", "/state/on")
            .with("channel.temp", "/state/temp")
            .with("channel.", "ignored")
            .with("host", "lamp.local");
        let keys: Vec<_> = cfg.with_prefix("channel.").map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["power", "temp"]);
    }

    #[test]
    fn test_display_masks_secrets() {
        let cfg = DeviceConfig::new()
            .with("host", "10.0.0.2")
            .with("password", "hunter2");
        let shown = cfg.to_string();
        assert!(shown.contains("host=10.0.0.2"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_typed_values() {
        let cfg: DeviceConfig =
            parse_json(r#"{"host": "a", "port": 80, "secure": true, "gain": 1.5}"#);
        assert_eq!(cfg.get("port"), Some(&ParamValue::Int(80)));
        assert_eq!(cfg.optional_bool("secure").unwrap(), Some(true));
        assert_eq!(cfg.get("gain"), Some(&ParamValue::Float(1.5)));
    }

    fn parse_json(json: &str) -> DeviceConfig {
        serde_json::from_str(json).unwrap()
    }
}
