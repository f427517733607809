// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dummy thermostat driver for development and testing.
//!
//! Holds device state in memory and answers every request immediately.
//! The temperature drifts half a degree towards the setpoint on every poll
//! while the heater is on. Each status reply also carries the current
//! `activity` (heating, cooling, idle or off) as a device property.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use hab_core::thing::DriverFuture;
use hab_core::{
    ChannelDef, ChannelId, ChannelUpdate, Command, Device, DeviceConfig, DeviceDriver, DriverError,
    DriverResult, ItemType, Payload, State, ThingInfo,
};

pub const THING_TYPE: &str = "dummy";

const MODES: &[&str] = &["heat", "eco", "off"];
const SETPOINT_MIN: f64 = 5.0;
const SETPOINT_MAX: f64 = 30.0;
const DRIFT_STEP: f64 = 0.5;

pub fn factory(config: &DeviceConfig) -> DriverResult<Box<dyn DeviceDriver>> {
    Ok(Box::new(DummyThermostat::from_config(config)?))
}

pub struct DummyThermostat {
    info: ThingInfo,
    power: bool,
    temperature: f64,
    setpoint: f64,
    mode: String,
    fail_polls: bool,
}

impl DummyThermostat {
    pub fn from_config(config: &DeviceConfig) -> DriverResult<Self> {
        let temperature = config.optional_f64("initial_temperature")?.unwrap_or(19.0);
        let setpoint = config.optional_f64("setpoint")?.unwrap_or(21.0);
        if !(SETPOINT_MIN..=SETPOINT_MAX).contains(&setpoint) {
            return Err(DriverError::configuration(format!(
                "setpoint {} outside {}..={}",
                setpoint, SETPOINT_MIN, SETPOINT_MAX
            )));
        }

        let mut properties = BTreeMap::new();
        properties.insert("firmware".to_string(), "1.0".to_string());
        properties.insert(
            "serial".to_string(),
            config
                .optional_str("serial")?
                .unwrap_or_else(|| "DUMMY-0001".to_string()),
        );

        Ok(Self {
            info: ThingInfo {
                thing_type: THING_TYPE.to_string(),
                vendor: "Dummy".to_string(),
                model: "thermostat".to_string(),
                channels: vec![
                    ChannelDef::writable("power", ItemType::Switch),
                    ChannelDef::read_only("temperature", ItemType::Number).with_unit("°C"),
                    ChannelDef::writable("setpoint", ItemType::Number).with_unit("°C"),
                    ChannelDef::writable("mode", ItemType::String),
                ],
                properties,
            },
            power: true,
            temperature,
            setpoint,
            mode: "heat".to_string(),
            fail_polls: config.optional_bool("fail_polls")?.unwrap_or(false),
        })
    }

    fn drift(&mut self) {
        if !self.power || self.mode == "off" {
            return;
        }
        let delta = self.setpoint - self.temperature;
        if delta.abs() <= DRIFT_STEP {
            self.temperature = self.setpoint;
        } else {
            self.temperature += DRIFT_STEP * delta.signum();
        }
    }

    fn activity(&self) -> &'static str {
        if !self.power || self.mode == "off" {
            "off"
        } else if self.temperature < self.setpoint {
            "heating"
        } else if self.temperature > self.setpoint {
            "cooling"
        } else {
            "idle"
        }
    }

    fn celsius(value: f64) -> State {
        State::Quantity {
            value,
            unit: "°C".to_string(),
        }
    }

    fn apply(&mut self, channel: &ChannelId, command: &Command) -> DriverResult<State> {
        match (channel.as_str(), command) {
            ("power", Command::OnOff(on)) => {
                self.power = *on;
                Ok(State::OnOff(*on))
            }
            ("setpoint", Command::Decimal(v) | Command::Quantity { value: v, .. }) => {
                if !(SETPOINT_MIN..=SETPOINT_MAX).contains(v) {
                    return Err(DriverError::api(
                        Some(422),
                        format!("setpoint {} outside {}..={}", v, SETPOINT_MIN, SETPOINT_MAX),
                    ));
                }
                self.setpoint = *v;
                Ok(Self::celsius(*v))
            }
            ("mode", Command::Text(mode)) => {
                let mode = mode.to_ascii_lowercase();
                if !MODES.contains(&mode.as_str()) {
                    return Err(DriverError::api(None, format!("unsupported mode '{}'", mode)));
                }
                self.mode = mode.clone();
                Ok(State::Text(mode))
            }
            _ => Err(DriverError::api(
                None,
                format!("channel '{}' does not accept '{}'", channel, command),
            )),
        }
    }
}

impl Device for DummyThermostat {
    fn info(&self) -> &ThingInfo {
        &self.info
    }
}

impl DeviceDriver for DummyThermostat {
    fn poll<'a>(&'a mut self) -> DriverFuture<'a, Payload> {
        Box::pin(async move {
            if self.fail_polls {
                return Err(DriverError::connection("simulated device unreachable"));
            }
            self.drift();
            Ok(Payload::Json(json!({
                "power": self.power,
                "temperature": self.temperature,
                "setpoint": self.setpoint,
                "mode": self.mode,
                "activity": self.activity(),
            })))
        })
    }

    fn parse_response(&self, payload: &Payload) -> DriverResult<Vec<ChannelUpdate>> {
        let Payload::Json(Value::Object(obj)) = payload else {
            return Err(DriverError::protocol("expected a JSON object"));
        };
        let mut updates = Vec::with_capacity(self.info.channels.len());
        for def in &self.info.channels {
            let value = obj.get(def.id.as_str()).unwrap_or(&Value::Null);
            let state = State::from_json(value, def.item_type, def.unit.as_deref())
                .map_err(DriverError::protocol)?;
            updates.push(ChannelUpdate::new(def.id.clone(), state));
        }
        Ok(updates)
    }

    fn parse_properties(&self, payload: &Payload) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        if let Payload::Json(Value::Object(obj)) = payload {
            if let Some(activity) = obj.get("activity").and_then(Value::as_str) {
                properties.insert("activity".to_string(), activity.to_string());
            }
        }
        properties
    }

    fn send_command<'a>(
        &'a mut self,
        channel: &'a ChannelId,
        command: &'a Command,
    ) -> DriverFuture<'a, Vec<ChannelUpdate>> {
        Box::pin(async move {
            if matches!(command, Command::Refresh) {
                return Ok(Vec::new());
            }
            let state = self.apply(channel, command)?;
            Ok(vec![ChannelUpdate::new(channel.clone(), state)])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_and_parse() {
        let mut dev = DummyThermostat::from_config(&DeviceConfig::new()).unwrap();
        let payload = dev.poll().await.unwrap();
        let updates = dev.parse_response(&payload).unwrap();
        assert_eq!(updates.len(), 4);
        assert_eq!(updates[0], ChannelUpdate::new("power", State::OnOff(true)));
        assert_eq!(
            updates[1],
            ChannelUpdate::new("temperature", DummyThermostat::celsius(19.5))
        );
    }

    #[tokio::test]
    async fn test_temperature_reaches_setpoint() {
        let cfg = DeviceConfig::new()
            .with("initial_temperature", 20.0)
            .with("setpoint", 21.0);
        let mut dev = DummyThermostat::from_config(&cfg).unwrap();
        for _ in 0..5 {
            dev.poll().await.unwrap();
        }
        assert_eq!(dev.temperature, 21.0);
    }

    #[tokio::test]
    async fn test_activity_property() {
        let cfg = DeviceConfig::new()
            .with("initial_temperature", 20.5)
            .with("setpoint", 21.0);
        let mut dev = DummyThermostat::from_config(&cfg).unwrap();
        let payload = dev.poll().await.unwrap();
        assert_eq!(dev.parse_properties(&payload)["activity"], "idle");

        dev.send_command(&"setpoint".into(), &Command::Decimal(18.0))
            .await
            .unwrap();
        let payload = dev.poll().await.unwrap();
        assert_eq!(dev.parse_properties(&payload)["activity"], "cooling");

        dev.send_command(&"power".into(), &Command::OnOff(false))
            .await
            .unwrap();
        let payload = dev.poll().await.unwrap();
        assert_eq!(dev.parse_properties(&payload)["activity"], "off");
        assert!(dev
            .parse_properties(&Payload::Text("x".into()))
            .is_empty());
    }

    #[tokio::test]
    async fn test_fail_polls() {
        let cfg = DeviceConfig::new().with("fail_polls", true);
        let mut dev = DummyThermostat::from_config(&cfg).unwrap();
        let err = dev.poll().await.unwrap_err();
        assert!(matches!(err, DriverError::Connection(_)));
    }

    #[tokio::test]
    async fn test_commands() {
        let mut dev = DummyThermostat::from_config(&DeviceConfig::new()).unwrap();
        let ack = dev
            .send_command(&"setpoint".into(), &Command::Decimal(23.0))
            .await
            .unwrap();
        assert_eq!(ack, vec![ChannelUpdate::new("setpoint", DummyThermostat::celsius(23.0))]);

        let err = dev
            .send_command(&"setpoint".into(), &Command::Decimal(40.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Api { code: Some(422), .. }));

        let err = dev
            .send_command(&"mode".into(), &Command::Text("turbo".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Api { .. }));
    }

    #[test]
    fn test_invalid_setpoint_config() {
        let cfg = DeviceConfig::new().with("setpoint", 99i64);
        assert!(matches!(
            DummyThermostat::from_config(&cfg),
            Err(DriverError::Configuration(_))
        ));
    }
}
