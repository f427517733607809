// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod listener;
mod thing_handle;
mod thing_task;

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use hab_app::init_logging;
use hab_core::{DynResult, ThingRequest};
use hab_driver::{register_builtin_drivers_on, DriverRegistry};
use hab_protocol::{NoAuthValidator, TokenSet, TokenValidator};

use config::ServerConfig;
use listener::ListenerContext;
use thing_handle::ThingHandle;
use thing_task::ThingTaskConfig;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - device polling and command daemon");
const THING_TASK_CHANNEL_BUFFER: usize = 32;
const SHUTDOWN_GRACE: Duration = Duration::from_millis(400);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Print registered thing types and exit
    #[arg(long = "list-thing-types")]
    list_thing_types: bool,
    /// IP address for the JSON TCP listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the JSON TCP listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
}

/// Spawn one thing task per configured thing.
fn spawn_things(
    cfg: &ServerConfig,
    registry: &Arc<DriverRegistry>,
    shutdown_rx: &watch::Receiver<bool>,
    task_handles: &mut Vec<JoinHandle<()>>,
) -> HashMap<String, ThingHandle> {
    let mut things = HashMap::new();
    for thing in &cfg.things {
        let uid = thing.uid.trim().to_string();
        let Some(thing_type) = thing.resolved_thing_type() else {
            warn!("{}: no thing type, skipping", uid);
            continue;
        };
        if !registry.is_registered(thing_type) {
            warn!("{}: no driver registered for thing type '{}'", uid, thing_type);
        }

        let mut task_config =
            ThingTaskConfig::new(Arc::clone(registry), uid.clone(), thing_type, thing.device_config());
        task_config.label = thing.label.clone();

        let (tx, rx) = mpsc::channel::<ThingRequest>(THING_TASK_CHANNEL_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(task_config.initial_snapshot());
        let task_shutdown_rx = shutdown_rx.clone();
        let task_uid = uid.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) =
                thing_task::run_thing_task(task_config, rx, snapshot_tx, task_shutdown_rx).await
            {
                error!("Thing task {} error: {:?}", task_uid, e);
            }
        }));

        let handle = ThingHandle {
            uid: uid.clone(),
            tx,
            snapshot_rx,
        };
        info!("Started thing {} ({})", handle.uid, thing_type);
        things.insert(uid, handle);
    }
    things
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    let mut registry = DriverRegistry::new();
    register_builtin_drivers_on(&mut registry);
    let registry = Arc::new(registry);

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }
    if cli.list_thing_types {
        for thing_type in registry.thing_types() {
            println!("{}", thing_type);
        }
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    let cfg = cfg.validated(config_path.as_deref())?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }
    info!(
        "Starting habd ({} things, drivers: {})",
        cfg.things.len(),
        registry.thing_types().join(", ")
    );
    if cfg.things.is_empty() {
        warn!("No [[things]] configured");
    }

    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let things = Arc::new(spawn_things(&cfg, &registry, &shutdown_rx, &mut task_handles));

    if cfg.listen.enabled {
        let listen_ip = cli.listen.unwrap_or(cfg.listen.listen);
        let listen_port = cli.port.unwrap_or(cfg.listen.port);
        let listen_addr = SocketAddr::from((listen_ip, listen_port));
        let tokens = TokenSet::new(cfg.listen.auth.tokens.iter().cloned());
        let validator: Arc<dyn TokenValidator> = if tokens.is_empty() {
            Arc::new(NoAuthValidator)
        } else {
            info!("Listener authentication enabled");
            Arc::new(tokens)
        };
        let ctx = ListenerContext {
            things: Arc::clone(&things),
            thing_types: Arc::new(registry.thing_types()),
            validator,
        };
        let listener_shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) = listener::run_listener(listen_addr, ctx, listener_shutdown_rx).await {
                error!("Listener error: {:?}", e);
            }
        }));
    }

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);
    drop(things);
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    Ok(())
}
