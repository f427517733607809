// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Polling policies for thing tasks.
//!
//! Failed requests are retried only by the next scheduled poll.

use std::time::Duration;

use crate::{DeviceConfig, DriverResult};

/// Policy for polling a device for status updates.
pub trait PollingPolicy: Send + Sync {
    /// Interval between polls, `None` when the device is never polled.
    fn interval(&self) -> Option<Duration>;
}

/// Fixed polling policy.
///
/// Uses a constant interval.
#[derive(Debug, Clone)]
pub struct FixedPolling {
    interval: Duration,
}

impl FixedPolling {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl PollingPolicy for FixedPolling {
    fn interval(&self) -> Option<Duration> {
        Some(self.interval)
    }
}

/// No polling policy - disables automatic polling.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPolling;

impl PollingPolicy for NoPolling {
    fn interval(&self) -> Option<Duration> {
        None
    }
}

/// Build the polling policy described by a device configuration.
pub fn polling_for(config: &DeviceConfig) -> DriverResult<Box<dyn PollingPolicy>> {
    Ok(match config.refresh_interval()? {
        Some(interval) => Box::new(FixedPolling::new(interval)),
        None => Box::new(NoPolling),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_polling() {
        let policy = FixedPolling::new(Duration::from_secs(10));
        assert_eq!(policy.interval(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_no_polling() {
        assert_eq!(NoPolling.interval(), None);
    }

    #[test]
    fn test_polling_for_config() {
        let policy = polling_for(&DeviceConfig::new().with("refresh", 5i64)).unwrap();
        assert_eq!(policy.interval(), Some(Duration::from_secs(5)));

        let policy = polling_for(&DeviceConfig::new().with("refresh", 0i64)).unwrap();
        assert_eq!(policy.interval(), None);

        assert!(polling_for(&DeviceConfig::new().with("refresh", "x")).is_err());
    }
}
