// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;

use hab_app::normalize_name;
use hab_core::{DeviceConfig, DeviceDriver, DriverError, DriverResult};

pub mod dummy;
#[cfg(feature = "http")]
pub mod http_json;
#[cfg(feature = "line")]
pub mod line;
pub mod mapping;

pub type DriverFactory = fn(&DeviceConfig) -> DriverResult<Box<dyn DeviceDriver>>;

/// Registry of driver factories keyed by thing-type UID.
///
/// Built once at startup and handed to every thing task.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, (String, DriverFactory)>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver factory under a thing-type UID (e.g. "http-json").
    pub fn register(&mut self, thing_type: &str, factory: DriverFactory) {
        let key = normalize_name(thing_type);
        self.factories.insert(key, (thing_type.to_string(), factory));
    }

    pub fn is_registered(&self, thing_type: &str) -> bool {
        self.factories.contains_key(&normalize_name(thing_type))
    }

    /// Registered thing-type UIDs, sorted.
    pub fn thing_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.values().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    /// Instantiate a driver for a thing type.
    ///
    /// An unknown thing type is a configuration error of the thing.
    pub fn build(&self, thing_type: &str, config: &DeviceConfig) -> DriverResult<Box<dyn DeviceDriver>> {
        let (_, factory) = self
            .factories
            .get(&normalize_name(thing_type))
            .ok_or_else(|| DriverError::configuration(format!("unknown thing type '{}'", thing_type)))?;
        factory(config)
    }

    /// Merge another registry into this one.
    pub fn extend_from(&mut self, other: &DriverRegistry) {
        for (key, entry) in &other.factories {
            self.factories.insert(key.clone(), entry.clone());
        }
    }
}

/// Register all built-in drivers enabled by features on a registry.
pub fn register_builtin_drivers_on(registry: &mut DriverRegistry) {
    registry.register(dummy::THING_TYPE, dummy::factory);
    #[cfg(feature = "http")]
    registry.register(http_json::THING_TYPE, http_json::factory);
    #[cfg(feature = "line")]
    registry.register(line::THING_TYPE, line::factory);
}
