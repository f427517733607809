// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Driver for ASCII line protocols over TCP or a serial port.
//!
//! Every request is one line out and one line back. A status reply is a
//! list of `key=value` fields separated by `,` or `;`, e.g.
//! `power=ON,temp=21.5`. A reply of `ERR` or `ERR <msg>` is a device-side
//! rejection. The connection is opened lazily and dropped after any I/O
//! failure, so the next request reconnects.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, warn};

use hab_core::thing::DriverFuture;
use hab_core::{
    ChannelId, ChannelUpdate, Command, Device, DeviceConfig, DeviceDriver, DriverError,
    DriverResult, Payload, State, ThingInfo,
};

use crate::mapping::{channels_from_config, properties_from_config, MappedChannel};

pub const THING_TYPE: &str = "line";

const DEFAULT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_BAUD: u32 = 9600;
const COMMAND_PREFIX: &str = "command.";

/// Byte stream a line device talks over.
pub trait LineIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LineIo for T {}

pub fn factory(config: &DeviceConfig) -> DriverResult<Box<dyn DeviceDriver>> {
    Ok(Box::new(LineDevice::from_config(config)?))
}

/// How to reach the device.
#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    Tcp { host: String, port: u16 },
    Serial { path: String, baud: u32 },
}

impl Transport {
    fn from_config(config: &DeviceConfig) -> DriverResult<Self> {
        let kind = config
            .optional_str("transport")?
            .unwrap_or_else(|| "tcp".to_string())
            .to_ascii_lowercase();
        match kind.as_str() {
            "tcp" => {
                let host = config.required_str("host")?;
                let port = config
                    .optional_u16("port")?
                    .ok_or_else(|| DriverError::configuration("missing required parameter 'port'"))?;
                Ok(Self::Tcp { host, port })
            }
            "serial" => {
                let path = config.required_str("serial_port")?;
                let baud = match config.optional_u64("baud")? {
                    Some(b) => u32::try_from(b)
                        .map_err(|_| DriverError::configuration(format!("baud {} out of range", b)))?,
                    None => DEFAULT_BAUD,
                };
                Ok(Self::Serial { path, baud })
            }
            other => Err(DriverError::configuration(format!(
                "transport must be 'tcp' or 'serial', got '{}'",
                other
            ))),
        }
    }

}

/// Opens a fresh stream to the device.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self) -> DriverFuture<'a, Box<dyn LineIo>>;
}

impl Connector for Transport {
    fn connect<'a>(&'a self) -> DriverFuture<'a, Box<dyn LineIo>> {
        Box::pin(async move {
            match self {
                Self::Tcp { host, port } => {
                    let stream = TcpStream::connect((host.as_str(), *port)).await?;
                    Ok(Box::new(stream) as Box<dyn LineIo>)
                }
                Self::Serial { path, baud } => {
                    let port = tokio_serial::new(path, *baud)
                        .open_native_async()
                        .map_err(|e| DriverError::connection(format!("{}: {}", path, e)))?;
                    Ok(Box::new(port) as Box<dyn LineIo>)
                }
            }
        })
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Self::Serial { path, baud } => write!(f, "serial://{}@{}", path, baud),
        }
    }
}

pub struct LineDevice {
    info: ThingInfo,
    endpoint: String,
    connector: Box<dyn Connector>,
    io_timeout: Duration,
    query: String,
    channels: Vec<MappedChannel>,
    /// `(property name, reply key)` pairs.
    reported: Vec<(String, String)>,
    templates: BTreeMap<ChannelId, String>,
    conn: Option<BufReader<Box<dyn LineIo>>>,
}

impl LineDevice {
    pub fn from_config(config: &DeviceConfig) -> DriverResult<Self> {
        let transport = Transport::from_config(config)?;
        let query = config.required_str("query")?;
        let io_timeout = Duration::from_millis(
            config
                .optional_u64("timeout_ms")?
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        );

        let templates: BTreeMap<ChannelId, String> = config
            .with_prefix(COMMAND_PREFIX)
            .map(|(id, tpl)| (ChannelId::from(id), tpl.to_string()))
            .collect();
        let mut channels = channels_from_config(config)?;
        for mapped in &mut channels {
            if templates.contains_key(&mapped.def.id) {
                mapped.def.writable = true;
            }
        }
        if let Some(orphan) = templates
            .keys()
            .find(|id| !channels.iter().any(|c| &c.def.id == *id))
        {
            return Err(DriverError::configuration(format!(
                "command template for unmapped channel '{}'",
                orphan
            )));
        }

        let mut properties = BTreeMap::new();
        properties.insert("transport".to_string(), transport.to_string());

        Ok(Self {
            info: ThingInfo {
                thing_type: THING_TYPE.to_string(),
                vendor: config
                    .optional_str("vendor")?
                    .unwrap_or_else(|| "Generic".to_string()),
                model: config
                    .optional_str("model")?
                    .unwrap_or_else(|| "line device".to_string()),
                channels: channels.iter().map(|c| c.def.clone()).collect(),
                properties,
            },
            endpoint: transport.to_string(),
            connector: Box::new(transport),
            io_timeout,
            query,
            channels,
            reported: properties_from_config(config)?,
            templates,
            conn: None,
        })
    }

    /// Use an already open stream instead of connecting on first request.
    pub fn with_stream<S: LineIo + 'static>(config: &DeviceConfig, stream: S) -> DriverResult<Self> {
        let mut dev = Self::from_config(config)?;
        dev.conn = Some(BufReader::new(Box::new(stream)));
        Ok(dev)
    }

    /// Open connections through `connector` instead of the configured
    /// transport.
    pub fn with_connector(config: &DeviceConfig, connector: Box<dyn Connector>) -> DriverResult<Self> {
        let mut dev = Self::from_config(config)?;
        dev.connector = connector;
        Ok(dev)
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Send one line and read one reply line.
    async fn request(&mut self, line: &str) -> DriverResult<String> {
        let result = timeout(self.io_timeout, self.exchange(line)).await;
        let result = match result {
            Ok(r) => r,
            Err(_) => Err(DriverError::connection(format!(
                "no reply from {} within {:?}",
                self.endpoint, self.io_timeout
            ))),
        };
        if let Err(err) = &result {
            if matches!(err, DriverError::Connection(_)) && self.conn.take().is_some() {
                warn!("Dropping connection to {}: {}", self.endpoint, err);
            }
        }
        let reply = result?;
        if let Some(message) = device_error(&reply) {
            return Err(DriverError::api(None, message));
        }
        Ok(reply)
    }

    async fn exchange(&mut self, line: &str) -> DriverResult<String> {
        if self.conn.is_none() {
            debug!("Connecting to {}", self.endpoint);
            self.conn = Some(BufReader::new(self.connector.connect().await?));
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(DriverError::connection("not connected"));
        };
        debug!("> {}", line);
        conn.get_mut().write_all(line.as_bytes()).await?;
        conn.get_mut().write_all(b"\n").await?;
        conn.get_mut().flush().await?;

        let mut reply = String::new();
        let n = conn.read_line(&mut reply).await?;
        if n == 0 {
            return Err(DriverError::connection("device closed the connection"));
        }
        let reply = reply.trim().to_string();
        debug!("< {}", reply);
        Ok(reply)
    }

    fn unit_state(mapped: &MappedChannel, state: State) -> State {
        match (state, mapped.def.unit.as_deref()) {
            (State::Decimal(value), Some(unit)) => State::Quantity {
                value,
                unit: unit.to_string(),
            },
            (state, _) => state,
        }
    }
}

/// Message of an `ERR` or `ERR <msg>` reply.
fn device_error(reply: &str) -> Option<&str> {
    if reply == "ERR" {
        return Some("rejected by device");
    }
    reply.strip_prefix("ERR ").map(str::trim)
}

/// Split a reply into `key=value` fields.
pub fn parse_fields(reply: &str) -> DriverResult<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    for part in reply.split([',', ';']) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((key, value)) = part.split_once('=') else {
            return Err(DriverError::protocol(format!("unparsable field '{}'", part)));
        };
        fields.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(fields)
}

impl Device for LineDevice {
    fn info(&self) -> &ThingInfo {
        &self.info
    }
}

impl DeviceDriver for LineDevice {
    fn poll<'a>(&'a mut self) -> DriverFuture<'a, Payload> {
        Box::pin(async move {
            let query = self.query.clone();
            let reply = self.request(&query).await?;
            Ok(Payload::Text(reply))
        })
    }

    fn parse_response(&self, payload: &Payload) -> DriverResult<Vec<ChannelUpdate>> {
        let Payload::Text(reply) = payload else {
            return Err(DriverError::protocol("expected a text reply"));
        };
        let fields = parse_fields(reply)?;
        if fields.is_empty() {
            return Err(DriverError::protocol("empty status reply"));
        }
        let mut updates = Vec::with_capacity(self.channels.len());
        for mapped in &self.channels {
            let state = match fields.get(&mapped.source) {
                None => State::Undef,
                Some(raw) => State::parse(raw, mapped.def.item_type, mapped.def.unit.as_deref())
                    .map_err(|e| DriverError::protocol(format!("channel '{}': {}", mapped.def.id, e)))?,
            };
            updates.push(ChannelUpdate::new(mapped.def.id.clone(), state));
        }
        Ok(updates)
    }

    fn parse_properties(&self, payload: &Payload) -> BTreeMap<String, String> {
        let Payload::Text(reply) = payload else {
            return BTreeMap::new();
        };
        let Ok(fields) = parse_fields(reply) else {
            return BTreeMap::new();
        };
        self.reported
            .iter()
            .filter_map(|(name, key)| fields.get(key).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    fn send_command<'a>(
        &'a mut self,
        channel: &'a ChannelId,
        command: &'a Command,
    ) -> DriverFuture<'a, Vec<ChannelUpdate>> {
        Box::pin(async move {
            let Some(state) = command.as_state() else {
                return Ok(Vec::new());
            };
            let Some(template) = self.templates.get(channel) else {
                return Err(DriverError::api(None, format!("channel '{}' has no command", channel)));
            };
            let line = template.replace("{value}", &command.to_string());
            let reply = self.request(&line).await?;

            // A reply carrying fields acknowledges with device values.
            if reply.contains('=') {
                return self.parse_response(&Payload::Text(reply)).map(|updates| {
                    updates
                        .into_iter()
                        .filter(|u| u.state != State::Undef)
                        .collect()
                });
            }
            let Some(mapped) = self.channels.iter().find(|c| &c.def.id == channel) else {
                return Ok(Vec::new());
            };
            Ok(vec![ChannelUpdate::new(
                channel.clone(),
                Self::unit_state(mapped, state),
            )])
        })
    }

    fn dispose<'a>(&'a mut self) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            if let Some(mut conn) = self.conn.take() {
                let _ = conn.get_mut().shutdown().await;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{duplex, DuplexStream};

    fn config() -> DeviceConfig {
        DeviceConfig::new()
            .with("host", "127.0.0.1")
            .with("port", 1i64)
            .with("query", "STATUS?")
            .with("channel.power", "pwr")
            .with("type.power", "switch")
            .with("command.power", "PWR {value}")
            .with("channel.voltage", "v")
            .with("unit.voltage", "V")
            .with("timeout_ms", 500i64)
    }

    /// Fake device answering each request line from a script.
    fn spawn_device(stream: DuplexStream, replies: Vec<(&'static str, &'static str)>) {
        tokio::spawn(async move {
            let mut stream = BufReader::new(stream);
            for (expect, reply) in replies {
                let mut line = String::new();
                if stream.read_line(&mut line).await.unwrap_or(0) == 0 {
                    return;
                }
                assert_eq!(line.trim(), expect);
                if reply.is_empty() {
                    // Stay silent to provoke a timeout.
                    continue;
                }
                stream.get_mut().write_all(reply.as_bytes()).await.unwrap();
                stream.get_mut().write_all(b"\n").await.unwrap();
            }
            // Keep the stream open until the driver side goes away.
            let mut rest = String::new();
            let _ = stream.read_line(&mut rest).await;
        });
    }

    #[test]
    fn test_transport_from_config() {
        assert_eq!(
            Transport::from_config(&config()).unwrap(),
            Transport::Tcp {
                host: "127.0.0.1".into(),
                port: 1
            }
        );
        let serial = DeviceConfig::new()
            .with("transport", "serial")
            .with("serial_port", "/dev/ttyUSB0");
        assert_eq!(
            Transport::from_config(&serial).unwrap(),
            Transport::Serial {
                path: "/dev/ttyUSB0".into(),
                baud: 9600
            }
        );
        let bad = DeviceConfig::new().with("transport", "carrier-pigeon");
        assert!(Transport::from_config(&bad).is_err());
        let no_port = DeviceConfig::new().with("host", "x");
        assert!(Transport::from_config(&no_port).is_err());
    }

    #[test]
    fn test_command_template_marks_writable() {
        let dev = LineDevice::from_config(&config()).unwrap();
        assert!(dev.info().channel(&"power".into()).unwrap().writable);
        assert!(!dev.info().channel(&"voltage".into()).unwrap().writable);
    }

    #[test]
    fn test_orphan_template_rejected() {
        let cfg = config().with("command.volume", "VOL {value}");
        assert!(matches!(
            LineDevice::from_config(&cfg),
            Err(DriverError::Configuration(_))
        ));
    }

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields("pwr=ON, v=230.5; extra = x").unwrap();
        assert_eq!(fields["pwr"], "ON");
        assert_eq!(fields["v"], "230.5");
        assert_eq!(fields["extra"], "x");
        assert!(parse_fields("garbage").is_err());
    }

    #[tokio::test]
    async fn test_poll_over_stream() {
        let (ours, theirs) = duplex(1024);
        spawn_device(theirs, vec![("STATUS?", "pwr=OFF,v=229.8")]);
        let mut dev = LineDevice::with_stream(&config(), ours).unwrap();

        let payload = dev.poll().await.unwrap();
        let updates = dev.parse_response(&payload).unwrap();
        assert_eq!(
            updates,
            vec![
                ChannelUpdate::new("power", State::OnOff(false)),
                ChannelUpdate::new(
                    "voltage",
                    State::Quantity {
                        value: 229.8,
                        unit: "V".into()
                    }
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_properties_from_reply() {
        let cfg = config().with("property.firmware", "fw");
        let (ours, theirs) = duplex(1024);
        spawn_device(theirs, vec![("STATUS?", "pwr=ON,v=230,fw=3.1")]);
        let mut dev = LineDevice::with_stream(&cfg, ours).unwrap();

        let payload = dev.poll().await.unwrap();
        assert_eq!(dev.parse_properties(&payload)["firmware"], "3.1");
        assert!(dev
            .parse_properties(&Payload::Text("pwr=OFF".into()))
            .is_empty());
    }

    #[tokio::test]
    async fn test_command_over_stream() {
        let (ours, theirs) = duplex(1024);
        spawn_device(theirs, vec![("PWR ON", "OK"), ("PWR OFF", "ERR locked")]);
        let mut dev = LineDevice::with_stream(&config(), ours).unwrap();

        let ack = dev
            .send_command(&"power".into(), &Command::OnOff(true))
            .await
            .unwrap();
        assert_eq!(ack, vec![ChannelUpdate::new("power", State::OnOff(true))]);

        let err = dev
            .send_command(&"power".into(), &Command::OnOff(false))
            .await
            .unwrap_err();
        assert_eq!(err, DriverError::api(None, "locked"));
        // Device-side rejection keeps the link.
        assert!(dev.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_drops_connection() {
        let (ours, theirs) = duplex(1024);
        spawn_device(theirs, vec![("STATUS?", "")]);
        let mut dev = LineDevice::with_stream(&config(), ours).unwrap();

        let err = dev.poll().await.unwrap_err();
        assert!(matches!(err, DriverError::Connection(_)));
        assert!(!dev.is_connected());
    }

    #[tokio::test]
    async fn test_err_prefixed_field_is_not_a_rejection() {
        let cfg = config().with("channel.errors", "ERRCOUNT");
        let (ours, theirs) = duplex(1024);
        spawn_device(theirs, vec![("STATUS?", "ERRCOUNT=0,pwr=ON"), ("STATUS?", "ERR")]);
        let mut dev = LineDevice::with_stream(&cfg, ours).unwrap();

        let payload = dev.poll().await.unwrap();
        let updates = dev.parse_response(&payload).unwrap();
        assert!(updates.contains(&ChannelUpdate::new("errors", State::Decimal(0.0))));
        assert!(updates.contains(&ChannelUpdate::new("power", State::OnOff(true))));

        let err = dev.poll().await.unwrap_err();
        assert!(matches!(err, DriverError::Api { code: None, .. }));
    }

    /// Hands out prepared streams, one per connection attempt.
    struct StreamQueue {
        streams: Mutex<Vec<DuplexStream>>,
        opened: Arc<AtomicUsize>,
    }

    impl Connector for StreamQueue {
        fn connect<'a>(&'a self) -> DriverFuture<'a, Box<dyn LineIo>> {
            Box::pin(async move {
                self.opened.fetch_add(1, Ordering::SeqCst);
                let stream = self.streams.lock().unwrap().pop();
                match stream {
                    Some(stream) => Ok(Box::new(stream) as Box<dyn LineIo>),
                    None => Err(DriverError::connection("connection refused")),
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_dropped_connection() {
        let (first, first_device) = duplex(1024);
        let (second, second_device) = duplex(1024);
        spawn_device(first_device, vec![("STATUS?", "")]);
        spawn_device(second_device, vec![("STATUS?", "pwr=ON,v=231")]);

        let opened = Arc::new(AtomicUsize::new(0));
        let connector = StreamQueue {
            streams: Mutex::new(vec![second, first]),
            opened: opened.clone(),
        };
        let mut dev = LineDevice::with_connector(&config(), Box::new(connector)).unwrap();
        assert!(!dev.is_connected());

        let err = dev.poll().await.unwrap_err();
        assert!(matches!(err, DriverError::Connection(_)));
        assert!(!dev.is_connected());
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        let payload = dev.poll().await.unwrap();
        assert!(dev.is_connected());
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        let updates = dev.parse_response(&payload).unwrap();
        assert!(updates.contains(&ChannelUpdate::new("power", State::OnOff(true))));
    }

    #[tokio::test]
    async fn test_unparsable_reply_is_protocol_error() {
        let (ours, theirs) = duplex(1024);
        spawn_device(theirs, vec![("STATUS?", "hello")]);
        let mut dev = LineDevice::with_stream(&config(), ours).unwrap();
        let payload = dev.poll().await.unwrap();
        assert!(matches!(
            dev.parse_response(&payload),
            Err(DriverError::Protocol(_))
        ));
    }
}
