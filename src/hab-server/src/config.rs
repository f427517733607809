// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for habd.
//!
//! Config is loaded from the `[hab-server]` section of `hab.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./hab.toml`
//! 3. `~/.config/hab-rs/hab.toml`
//! 4. `/etc/hab-rs/hab.toml`

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hab_app::{thing_type_of, ConfigError, ConfigFile};
use hab_core::thing::config::REFRESH_KEY;
use hab_core::DeviceConfig;

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// TCP listener configuration
    pub listen: ListenConfig,
    /// Configured device instances
    pub things: Vec<ThingConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// TCP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Whether the listener is enabled
    pub enabled: bool,
    /// IP address to listen on
    pub listen: IpAddr,
    /// TCP port to listen on
    pub port: u16,
    /// Authentication configuration
    pub auth: AuthConfig,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 4750,
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication configuration for the TCP listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Valid authentication tokens (empty = no auth required)
    pub tokens: Vec<String>,
}

/// One `[[things]]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThingConfig {
    /// Thing UID, `<thing-type>:<id>`.
    pub uid: String,
    /// Explicit thing type. Derived from the UID when omitted.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub thing_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Polling interval in seconds; `0` disables polling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<i64>,
    /// Driver-specific connection parameters.
    pub params: DeviceConfig,
}

impl ThingConfig {
    pub fn resolved_thing_type(&self) -> Option<&str> {
        match self.thing_type.as_deref() {
            Some(ty) if !ty.trim().is_empty() => Some(ty.trim()),
            _ => thing_type_of(&self.uid),
        }
    }

    /// Driver parameters with `refresh` folded in.
    pub fn device_config(&self) -> DeviceConfig {
        match self.refresh {
            Some(secs) => self.params.clone().with(REFRESH_KEY, secs),
            None => self.params.clone(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        validate_tokens("[listen.auth].tokens", &self.listen.auth.tokens)?;
        if self.listen.enabled && self.listen.port == 0 {
            return Err("[listen].port must be > 0 when listener is enabled".to_string());
        }

        let mut seen = HashSet::new();
        for (idx, thing) in self.things.iter().enumerate() {
            let uid = thing.uid.trim();
            if uid.is_empty() {
                return Err(format!("[[things]] entry {} has an empty uid", idx));
            }
            if uid.chars().any(char::is_whitespace) {
                return Err(format!("[[things]] uid '{}' must not contain whitespace", uid));
            }
            if thing.resolved_thing_type().is_none() {
                return Err(format!(
                    "[[things]] uid '{}' has no thing type (use '<type>:<id>' or set type)",
                    uid
                ));
            }
            if !seen.insert(uid) {
                return Err(format!("[[things]] uid '{}' is configured more than once", uid));
            }
        }
        Ok(())
    }

    /// Validate, reporting problems against the file the config came from.
    pub fn validated(self, origin: Option<&Path>) -> Result<Self, ConfigError> {
        match self.validate() {
            Ok(()) => Ok(self),
            Err(msg) => Err(ConfigError::Invalid(
                origin
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("<defaults>")),
                msg,
            )),
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no config file is found.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Generate an example configuration wrapped under the `[hab-server]`
    /// section header, suitable for use in a combined `hab.toml` file.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "hab-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            listen: ListenConfig::default(),
            things: vec![
                ThingConfig {
                    uid: "dummy:living-room".to_string(),
                    thing_type: None,
                    label: Some("Living room thermostat".to_string()),
                    refresh: Some(30),
                    params: DeviceConfig::new().with("setpoint", 21.0),
                },
                ThingConfig {
                    uid: "http-json:kitchen".to_string(),
                    thing_type: None,
                    label: Some("Kitchen plug".to_string()),
                    refresh: Some(60),
                    params: DeviceConfig::new()
                        .with("host", "192.168.1.40")
                        .with("status_path", "/status")
                        .with("channel.power", "relay.on")
                        .with("type.power", "switch")
                        .with("writable.power", true)
                        .with("channel.energy", "meter.total")
                        .with("unit.energy", "kWh"),
                },
            ],
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

fn validate_tokens(path: &str, tokens: &[String]) -> Result<(), String> {
    if tokens.iter().any(|t| t.trim().is_empty()) {
        return Err(format!("{path} must not contain empty tokens"));
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "hab-server"
    }
}
