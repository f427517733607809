// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thing task: owns one device driver and runs its poller, command
//! dispatcher and connection tracker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use hab_core::thing::controller::{
    polling_for, validate_command, ConnectionTracker, StatusEvent, ThingEventEmitter,
    ThingListener,
};
use hab_core::{
    ChannelId, ChannelSnapshot, ChannelUpdate, Command, DeviceConfig, DeviceDriver, DeviceState,
    DriverError, DynResult, RequestError, RequestResult, State, StatusInfo, ThingCommand,
    ThingRequest, ThingSnapshot,
};
use hab_driver::DriverRegistry;

/// Configuration for one thing task.
pub struct ThingTaskConfig {
    pub registry: Arc<DriverRegistry>,
    pub uid: String,
    pub thing_type: String,
    pub label: Option<String>,
    pub device_config: DeviceConfig,
    /// Extra listeners notified of channel updates and status changes.
    pub listeners: Vec<Arc<dyn ThingListener>>,
    /// Used for the first initialization instead of the registry factory.
    pub prebuilt_driver: Option<Box<dyn DeviceDriver>>,
}

impl ThingTaskConfig {
    pub fn new(
        registry: Arc<DriverRegistry>,
        uid: impl Into<String>,
        thing_type: impl Into<String>,
        device_config: DeviceConfig,
    ) -> Self {
        Self {
            registry,
            uid: uid.into(),
            thing_type: thing_type.into(),
            label: None,
            device_config,
            listeners: Vec::new(),
            prebuilt_driver: None,
        }
    }

    /// Snapshot published before the task has initialized the driver.
    pub fn initial_snapshot(&self) -> ThingSnapshot {
        ThingSnapshot {
            uid: self.uid.clone(),
            thing_type: self.thing_type.clone(),
            label: self.label.clone(),
            status: StatusInfo::default(),
            channels: Vec::new(),
            properties: BTreeMap::new(),
            poll_count: 0,
            last_poll_ok: None,
        }
    }
}

/// Logs channel updates and status transitions.
pub struct TracingListener;

impl ThingListener for TracingListener {
    fn on_channel_update(&self, uid: &str, channel: &ChannelId, old: Option<&State>, new: &State) {
        match old {
            Some(old) => debug!("{}: {} changed {} -> {}", uid, channel, old, new),
            None => debug!("{}: {} = {}", uid, channel, new),
        }
    }

    fn on_status_change(&self, uid: &str, old: &StatusInfo, new: &StatusInfo) {
        if new.status == hab_core::ThingStatus::Online {
            info!("{}: {} -> {}", uid, old, new);
        } else {
            warn!("{}: {} -> {}", uid, old, new);
        }
    }
}

/// Resolve once the shutdown flag is set or its sender is gone.
pub async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    if *shutdown_rx.borrow() {
        return;
    }
    while shutdown_rx.changed().await.is_ok() {
        if *shutdown_rx.borrow() {
            break;
        }
    }
}

/// Run one thing until shutdown or until every request sender is dropped.
pub async fn run_thing_task(
    config: ThingTaskConfig,
    mut rx: mpsc::Receiver<ThingRequest>,
    snapshot_tx: watch::Sender<ThingSnapshot>,
    shutdown_rx: watch::Receiver<bool>,
) -> DynResult<()> {
    let mut emitter = ThingEventEmitter::new();
    emitter.register(Arc::new(TracingListener));
    for listener in config.listeners {
        emitter.register(listener);
    }

    let mut thing = Thing {
        registry: config.registry,
        uid: config.uid,
        thing_type: config.thing_type,
        label: config.label,
        device_config: config.device_config,
        driver: None,
        pending_driver: config.prebuilt_driver,
        state: DeviceState::new(),
        properties: BTreeMap::new(),
        tracker: ConnectionTracker::new(),
        emitter,
        timer: None,
        poll_count: 0,
        last_poll_ok: None,
        snapshot_tx,
    };

    thing.initialize();

    loop {
        tokio::select! {
            _ = next_tick(&mut thing.timer) => {
                thing.poll_once().await;
            }
            maybe_req = rx.recv() => {
                let Some(ThingRequest { cmd, respond_to }) = maybe_req else {
                    info!("{}: thing task shutting down (channel closed)", thing.uid);
                    break;
                };
                let cmd_label = command_label(&cmd);
                let started = Instant::now();

                let result = thing.process_command(cmd).await;
                let _ = respond_to.send(result);

                let elapsed = started.elapsed();
                if elapsed > Duration::from_millis(500) {
                    warn!("{}: command {} took {:?}", thing.uid, cmd_label, elapsed);
                } else {
                    debug!("{}: command {} completed in {:?}", thing.uid, cmd_label, elapsed);
                }
            }
            _ = wait_for_shutdown(shutdown_rx.clone()) => {
                info!("{}: thing task shutting down", thing.uid);
                break;
            }
        }
    }

    thing.dispose().await;
    Ok(())
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn command_label(cmd: &ThingCommand) -> String {
    match cmd {
        ThingCommand::GetSnapshot => "get_snapshot".to_string(),
        ThingCommand::SendCommand { channel, command } => format!("{} <- {}", channel, command),
        ThingCommand::Refresh => "refresh".to_string(),
        ThingCommand::Reconfigure(_) => "reconfigure".to_string(),
    }
}

/// Runtime state of one thing, owned by its task.
struct Thing {
    registry: Arc<DriverRegistry>,
    uid: String,
    thing_type: String,
    label: Option<String>,
    device_config: DeviceConfig,
    driver: Option<Box<dyn DeviceDriver>>,
    pending_driver: Option<Box<dyn DeviceDriver>>,
    state: DeviceState,
    /// Properties reported by the last successful polls.
    properties: BTreeMap<String, String>,
    tracker: ConnectionTracker,
    emitter: ThingEventEmitter,
    timer: Option<Interval>,
    poll_count: u64,
    last_poll_ok: Option<bool>,
    snapshot_tx: watch::Sender<ThingSnapshot>,
}

impl Thing {
    /// Build the driver and arm the poll timer.
    ///
    /// A rejected configuration leaves the thing without a driver or timer.
    fn initialize(&mut self) {
        match self.build_driver() {
            Ok((driver, interval)) => {
                let info = driver.info();
                info!(
                    "{}: driver ready ({} {}, {} channels)",
                    self.uid,
                    info.vendor,
                    info.model,
                    info.channels.len()
                );
                self.driver = Some(driver);
                self.timer = match interval {
                    Some(period) => {
                        info!("{}: polling every {:?}", self.uid, period);
                        let mut timer = time::interval(period);
                        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        Some(timer)
                    }
                    None => {
                        info!("{}: polling disabled", self.uid);
                        None
                    }
                };
            }
            Err(err) => {
                error!("{}: configuration rejected: {}", self.uid, err);
                self.timer = None;
                self.record(StatusEvent::ConfigurationRejected(err.message().to_string()));
            }
        }
        self.publish();
    }

    fn build_driver(&mut self) -> Result<(Box<dyn DeviceDriver>, Option<Duration>), DriverError> {
        let policy = polling_for(&self.device_config)?;
        let driver = match self.pending_driver.take() {
            Some(driver) => driver,
            None => {
                debug!(
                    "{}: building {} driver ({})",
                    self.uid, self.thing_type, self.device_config
                );
                self.registry.build(&self.thing_type, &self.device_config)?
            }
        };
        Ok((driver, policy.interval()))
    }

    async fn poll_once(&mut self) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        self.poll_count += 1;
        let result = match driver.poll().await {
            Ok(payload) => driver
                .parse_response(&payload)
                .map(|updates| (updates, driver.parse_properties(&payload))),
            Err(err) => Err(err),
        };
        match result {
            Ok((updates, properties)) => {
                self.last_poll_ok = Some(true);
                self.apply_updates(updates);
                self.update_properties(properties);
                self.record(StatusEvent::RequestSucceeded);
            }
            Err(err) => {
                warn!("{}: poll failed: {}", self.uid, err);
                self.last_poll_ok = Some(false);
                self.record(StatusEvent::RequestFailed(err));
            }
        }
        self.publish();
    }

    async fn process_command(&mut self, cmd: ThingCommand) -> RequestResult<ThingSnapshot> {
        match cmd {
            ThingCommand::GetSnapshot => Ok(self.snapshot()),
            ThingCommand::SendCommand { channel, command } => {
                self.dispatch(channel, command).await
            }
            ThingCommand::Refresh => {
                self.require_driver()?;
                self.poll_once().await;
                Ok(self.snapshot())
            }
            ThingCommand::Reconfigure(device_config) => self.reconfigure(device_config).await,
        }
    }

    async fn dispatch(&mut self, channel: ChannelId, command: Command) -> RequestResult<ThingSnapshot> {
        let driver = self.require_driver()?;
        let command = match driver.info().channel(&channel) {
            Some(def) => def.item_type.coerce(command),
            None => command,
        };
        let validation = validate_command(driver.info(), &channel, &command);
        if let Some(reason) = validation.reason() {
            warn!("{}: command rejected: {}", self.uid, reason);
            return Err(RequestError::invalid_command(reason));
        }

        if matches!(command, Command::Refresh) {
            self.poll_once().await;
            return Ok(self.snapshot());
        }

        let result = driver.send_command(&channel, &command).await;
        match result {
            Ok(acks) => {
                self.apply_updates(acks);
                self.record(StatusEvent::RequestSucceeded);
                self.publish();
                Ok(self.snapshot())
            }
            Err(err) => {
                error!("{}: command {} <- {} failed: {}", self.uid, channel, command, err);
                let reply = RequestError::from(err.clone());
                self.record(StatusEvent::RequestFailed(err));
                self.publish();
                Err(reply)
            }
        }
    }

    async fn reconfigure(&mut self, device_config: DeviceConfig) -> RequestResult<ThingSnapshot> {
        info!("{}: reconfiguring ({})", self.uid, device_config);
        self.release_driver().await;
        self.record(StatusEvent::Reconfigured);
        self.state.clear();
        self.properties.clear();
        self.last_poll_ok = None;
        self.device_config = device_config;
        self.initialize();

        if self.driver.is_none() {
            let reason = self
                .tracker
                .info()
                .description
                .clone()
                .unwrap_or_else(|| "configuration rejected".to_string());
            return Err(RequestError::from(DriverError::configuration(reason)));
        }
        Ok(self.snapshot())
    }

    async fn dispose(&mut self) {
        self.timer = None;
        self.release_driver().await;
        self.record(StatusEvent::Disposed);
        self.publish();
    }

    async fn release_driver(&mut self) {
        self.timer = None;
        if let Some(mut driver) = self.driver.take() {
            if let Err(err) = driver.dispose().await {
                warn!("{}: dispose failed: {}", self.uid, err);
            }
        }
    }

    fn require_driver(&mut self) -> RequestResult<&mut Box<dyn DeviceDriver>> {
        let status = self.tracker.info().clone();
        self.driver
            .as_mut()
            .ok_or_else(|| RequestError::unavailable(format!("thing is {}", status)))
    }

    /// Store values for known channels and notify listeners of changes.
    fn apply_updates(&mut self, updates: Vec<ChannelUpdate>) {
        let Some(driver) = self.driver.as_ref() else {
            return;
        };
        let info = driver.info();
        let updates: Vec<ChannelUpdate> = updates
            .into_iter()
            .filter(|u| {
                let known = info.channel(&u.channel).is_some();
                if !known {
                    debug!("{}: dropping update for unknown channel {}", self.uid, u.channel);
                }
                known
            })
            .collect();
        for change in self.state.apply(updates) {
            self.emitter
                .notify_channel_update(&self.uid, &change.channel, change.old.as_ref(), &change.new);
        }
    }

    fn update_properties(&mut self, properties: BTreeMap<String, String>) {
        for (key, value) in properties {
            if self.properties.get(&key) != Some(&value) {
                debug!("{}: property {} = {}", self.uid, key, value);
                self.properties.insert(key, value);
            }
        }
    }

    fn record(&mut self, event: StatusEvent) {
        if let Some(transition) = self.tracker.process_event(event) {
            self.emitter
                .notify_status_change(&self.uid, &transition.from, &transition.to);
        }
    }

    fn snapshot(&self) -> ThingSnapshot {
        let mut channels = Vec::new();
        let mut properties = BTreeMap::new();
        if let Some(driver) = self.driver.as_ref() {
            let info = driver.info();
            channels = info
                .channels
                .iter()
                .map(|def| ChannelSnapshot {
                    def: def.clone(),
                    state: self.state.get(&def.id).cloned().unwrap_or(State::Undef),
                })
                .collect();
            properties = info.properties.clone();
            properties.extend(self.properties.clone());
            properties.insert("vendor".to_string(), info.vendor.clone());
            properties.insert("model".to_string(), info.model.clone());
        }
        ThingSnapshot {
            uid: self.uid.clone(),
            thing_type: self.thing_type.clone(),
            label: self.label.clone(),
            status: self.tracker.info().clone(),
            channels,
            properties,
            poll_count: self.poll_count,
            last_poll_ok: self.last_poll_ok,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
