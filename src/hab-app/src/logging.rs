// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable holding a filter directive, e.g. `debug,hab_driver=trace`.
pub const LOG_ENV: &str = "HAB_LOG";

fn level_from_config(log_level: Option<&str>) -> Level {
    log_level
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Initialize logging with optional level from config.
///
/// `HAB_LOG` overrides the configured level when it holds a valid
/// directive. Falls back to INFO if level is None or invalid.
pub fn init_logging(log_level: Option<&str>) {
    let level = level_from_config(log_level);
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()));

    let result = FmtSubscriber::builder()
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
    if let Err(err) = result {
        eprintln!("logging already initialized: {}", err);
    }
}
