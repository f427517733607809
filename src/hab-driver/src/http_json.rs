// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Driver for devices with a REST/JSON status endpoint.
//!
//! A poll is one `GET <status_path>`; every configured channel is read from
//! the reply through a JSON pointer. Commands are sent as
//! `POST <command_path>` with `{"<command_key>": <value>}` as the body.
//! `property.<name>` pointers copy reply fields into the thing properties.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use hab_core::thing::DriverFuture;
use hab_core::{
    ChannelId, ChannelUpdate, Command, Device, DeviceConfig, DeviceDriver, DriverError,
    DriverResult, Payload, State, ThingInfo,
};

use crate::mapping::{channels_from_config, properties_from_config, MappedChannel};

pub const THING_TYPE: &str = "http-json";

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STATUS_PATH: &str = "/status";
const DEFAULT_COMMAND_PATH: &str = "/channels/{channel}";
const MAX_ERROR_BODY: usize = 200;

pub fn factory(config: &DeviceConfig) -> DriverResult<Box<dyn DeviceDriver>> {
    Ok(Box::new(HttpJsonDevice::from_config(config)?))
}

#[derive(Debug, Clone, PartialEq)]
struct Credentials {
    username: String,
    password: Option<String>,
}

pub struct HttpJsonDevice {
    info: ThingInfo,
    client: Client,
    base_url: String,
    status_path: String,
    command_path: String,
    command_key: String,
    credentials: Option<Credentials>,
    channels: Vec<MappedChannel>,
    /// `(property name, JSON pointer)` pairs.
    properties: Vec<(String, String)>,
}

impl HttpJsonDevice {
    pub fn from_config(config: &DeviceConfig) -> DriverResult<Self> {
        let host = config.required_str("host")?;
        let scheme = config
            .optional_str("scheme")?
            .unwrap_or_else(|| "http".to_string())
            .to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(DriverError::configuration(format!(
                "scheme must be 'http' or 'https', got '{}'",
                scheme
            )));
        }
        let base_url = match config.optional_u16("port")? {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        };
        let timeout = Duration::from_millis(
            config
                .optional_u64("timeout_ms")?
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        );
        let credentials = config.optional_str("username")?.map(|username| Credentials {
            username,
            password: config.optional_str("password").ok().flatten(),
        });
        let channels = channels_from_config(config)?
            .into_iter()
            .map(|mut c| {
                c.source = json_pointer(&c.source);
                c
            })
            .collect::<Vec<_>>();
        let reported = properties_from_config(config)?
            .into_iter()
            .map(|(name, source)| (name, json_pointer(&source)))
            .collect();

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DriverError::configuration(format!("http client: {}", e)))?;

        let mut properties = BTreeMap::new();
        properties.insert("base_url".to_string(), base_url.clone());

        Ok(Self {
            info: ThingInfo {
                thing_type: THING_TYPE.to_string(),
                vendor: config
                    .optional_str("vendor")?
                    .unwrap_or_else(|| "Generic".to_string()),
                model: config
                    .optional_str("model")?
                    .unwrap_or_else(|| "REST/JSON device".to_string()),
                channels: channels.iter().map(|c| c.def.clone()).collect(),
                properties,
            },
            client,
            base_url,
            status_path: leading_slash(
                config
                    .optional_str("status_path")?
                    .unwrap_or_else(|| DEFAULT_STATUS_PATH.to_string()),
            ),
            command_path: leading_slash(
                config
                    .optional_str("command_path")?
                    .unwrap_or_else(|| DEFAULT_COMMAND_PATH.to_string()),
            ),
            command_key: config
                .optional_str("command_key")?
                .unwrap_or_else(|| "value".to_string()),
            credentials,
            channels,
            properties: reported,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(c) => req.basic_auth(&c.username, c.password.as_ref()),
            None => req,
        }
    }

    /// Send a prepared request and return the body of a 2xx reply.
    async fn execute(&self, req: reqwest::RequestBuilder) -> DriverResult<Vec<u8>> {
        let resp = self.with_auth(req).send().await.map_err(map_reqwest_error)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Ok(body.to_vec())
    }

    fn mapped(&self, channel: &ChannelId) -> Option<&MappedChannel> {
        self.channels.iter().find(|c| &c.def.id == channel)
    }
}

impl Device for HttpJsonDevice {
    fn info(&self) -> &ThingInfo {
        &self.info
    }
}

impl DeviceDriver for HttpJsonDevice {
    fn poll<'a>(&'a mut self) -> DriverFuture<'a, Payload> {
        Box::pin(async move {
            let url = self.url(&self.status_path);
            debug!("GET {}", url);
            let body = self.execute(self.client.get(&url)).await?;
            let value: Value = serde_json::from_slice(&body)
                .map_err(|e| DriverError::protocol(format!("malformed JSON from {}: {}", url, e)))?;
            Ok(Payload::Json(value))
        })
    }

    fn parse_response(&self, payload: &Payload) -> DriverResult<Vec<ChannelUpdate>> {
        let Payload::Json(root) = payload else {
            return Err(DriverError::protocol("expected a JSON payload"));
        };
        let mut updates = Vec::with_capacity(self.channels.len());
        for mapped in &self.channels {
            let state = match root.pointer(&mapped.source) {
                None => State::Undef,
                Some(value) => State::from_json(value, mapped.def.item_type, mapped.def.unit.as_deref())
                    .map_err(|e| DriverError::protocol(format!("channel '{}': {}", mapped.def.id, e)))?,
            };
            updates.push(ChannelUpdate::new(mapped.def.id.clone(), state));
        }
        Ok(updates)
    }

    fn parse_properties(&self, payload: &Payload) -> BTreeMap<String, String> {
        let Payload::Json(root) = payload else {
            return BTreeMap::new();
        };
        self.properties
            .iter()
            .filter_map(|(name, pointer)| {
                let text = match root.pointer(pointer)? {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((name.clone(), text))
            })
            .collect()
    }

    fn send_command<'a>(
        &'a mut self,
        channel: &'a ChannelId,
        command: &'a Command,
    ) -> DriverFuture<'a, Vec<ChannelUpdate>> {
        Box::pin(async move {
            let Some(mapped) = self.mapped(channel) else {
                return Err(DriverError::api(None, format!("unknown channel '{}'", channel)));
            };
            let Some(state) = command.as_state() else {
                return Ok(Vec::new());
            };
            let url = self.url(&self.command_path.replace("{channel}", channel.as_str()));
            let mut body = serde_json::Map::new();
            body.insert(self.command_key.clone(), command.to_json());
            let body = Value::Object(body);
            debug!("POST {} {}", url, body);
            self.execute(self.client.post(&url).json(&body)).await?;

            let state = match (state, mapped.def.unit.as_deref()) {
                (State::Decimal(value), Some(unit)) => State::Quantity {
                    value,
                    unit: unit.to_string(),
                },
                (state, _) => state,
            };
            Ok(vec![ChannelUpdate::new(channel.clone(), state)])
        })
    }
}

/// Accept either a JSON pointer (`/a/b`) or a dotted path (`a.b`).
fn json_pointer(source: &str) -> String {
    let source = source.trim();
    if source.starts_with('/') {
        return source.to_string();
    }
    source
        .split('.')
        .map(|part| format!("/{}", part.replace('~', "~0").replace('/', "~1")))
        .collect()
}

fn leading_slash(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> DriverError {
    if err.is_decode() {
        DriverError::protocol(err.to_string())
    } else {
        DriverError::connection(err.to_string())
    }
}

fn api_error(status: StatusCode, body: &[u8]) -> DriverError {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let mut message = status
        .canonical_reason()
        .unwrap_or("unexpected status")
        .to_string();
    if !text.is_empty() {
        message.push_str(": ");
        message.extend(text.chars().take(MAX_ERROR_BODY));
    }
    DriverError::api(Some(i64::from(status.as_u16())), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hab_core::ItemType;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn config() -> DeviceConfig {
        DeviceConfig::new()
            .with("host", "127.0.0.1")
            .with("port", 8080i64)
            .with("channel.power", "/state/on")
            .with("type.power", "switch")
            .with("writable.power", true)
            .with("channel.temperature", "state.temperature")
            .with("unit.temperature", "°C")
            .with("channel.humidity", "/state/humidity")
    }

    #[test]
    fn test_missing_host_is_configuration_error() {
        let err = HttpJsonDevice::from_config(&DeviceConfig::new().with("channel.x", "/x"))
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::Configuration(ref m) if m.contains("host")));
    }

    #[test]
    fn test_bad_scheme_rejected() {
        let cfg = config().with("scheme", "ftp");
        assert!(matches!(
            HttpJsonDevice::from_config(&cfg),
            Err(DriverError::Configuration(_))
        ));
    }

    #[test]
    fn test_info_from_mappings() {
        let dev = HttpJsonDevice::from_config(&config()).unwrap();
        assert_eq!(dev.base_url, "http://127.0.0.1:8080");
        let power = dev.info().channel(&"power".into()).unwrap();
        assert_eq!(power.item_type, ItemType::Switch);
        assert!(power.writable);
        assert_eq!(dev.mapped(&"temperature".into()).unwrap().source, "/state/temperature");
    }

    #[test]
    fn test_parse_response() {
        let dev = HttpJsonDevice::from_config(&config()).unwrap();
        let payload = Payload::Json(json!({"state": {"on": true, "temperature": 21.5}}));
        let updates = dev.parse_response(&payload).unwrap();
        let by_id: BTreeMap<_, _> = updates
            .into_iter()
            .map(|u| (u.channel.as_str().to_string(), u.state))
            .collect();
        assert_eq!(by_id["power"], State::OnOff(true));
        assert_eq!(
            by_id["temperature"],
            State::Quantity {
                value: 21.5,
                unit: "°C".to_string()
            }
        );
        // Absent pointer means the device did not report the value.
        assert_eq!(by_id["humidity"], State::Undef);
    }

    #[test]
    fn test_parse_type_mismatch_is_protocol_error() {
        let dev = HttpJsonDevice::from_config(&config()).unwrap();
        let payload = Payload::Json(json!({"state": {"on": [1], "temperature": 1}}));
        assert!(matches!(
            dev.parse_response(&payload),
            Err(DriverError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_properties() {
        let cfg = config()
            .with("property.firmware", "info.fw")
            .with("property.uptime", "/info/uptime")
            .with("property.serial", "/info/serial");
        let dev = HttpJsonDevice::from_config(&cfg).unwrap();
        let payload = Payload::Json(json!({"info": {"fw": "2.4.1", "uptime": 360, "serial": null}}));
        let properties = dev.parse_properties(&payload);
        assert_eq!(properties["firmware"], "2.4.1");
        assert_eq!(properties["uptime"], "360");
        // Null and absent fields leave the property alone.
        assert!(!properties.contains_key("serial"));
    }

    #[test]
    fn test_json_pointer() {
        assert_eq!(json_pointer("/a/b"), "/a/b");
        assert_eq!(json_pointer("a.b"), "/a/b");
        assert_eq!(json_pointer("temp"), "/temp");
    }

    #[test]
    fn test_api_error() {
        let err = api_error(StatusCode::UNAUTHORIZED, b"bad token");
        assert_eq!(
            err,
            DriverError::api(Some(401), "Unauthorized: bad token")
        );
    }

    async fn serve_once(status_line: &'static str, body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        port
    }

    /// Answer one request with `204 No Content` and hand back the raw
    /// request (head and body).
    async fn capture_once() -> (u16, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&request).to_string());
        });
        (port, rx)
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn test_send_command_request() {
        let (port, request) = capture_once().await;
        let cfg = config()
            .with("port", i64::from(port))
            .with("command_path", "api/{channel}/set")
            .with("command_key", "state")
            .with("username", "admin")
            .with("password", "secret");
        let mut dev = HttpJsonDevice::from_config(&cfg).unwrap();

        let ack = dev
            .send_command(&"power".into(), &Command::OnOff(true))
            .await
            .unwrap();
        assert_eq!(ack, vec![ChannelUpdate::new("power", State::OnOff(true))]);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/power/set HTTP/1.1\r\n"), "{}", request);
        // "admin:secret" in base64.
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: basic ywrtaw46c2vjcmv0"));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        assert_eq!(serde_json::from_str::<Value>(body).unwrap(), json!({"state": true}));
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn test_send_command_acknowledges_with_unit() {
        let (port, request) = capture_once().await;
        let cfg = config()
            .with("port", i64::from(port))
            .with("channel.setpoint", "/state/setpoint")
            .with("unit.setpoint", "°C")
            .with("writable.setpoint", true);
        let mut dev = HttpJsonDevice::from_config(&cfg).unwrap();

        let ack = dev
            .send_command(&"setpoint".into(), &Command::Decimal(22.5))
            .await
            .unwrap();
        assert_eq!(
            ack,
            vec![ChannelUpdate::new(
                "setpoint",
                State::Quantity {
                    value: 22.5,
                    unit: "°C".to_string()
                }
            )]
        );
        let request = request.await.unwrap();
        assert!(request.starts_with("POST /channels/setpoint HTTP/1.1\r\n"));
        assert!(!request.to_ascii_lowercase().contains("authorization:"));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        assert_eq!(serde_json::from_str::<Value>(body).unwrap(), json!({"value": 22.5}));
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn test_poll_over_http() {
        let port = serve_once("200 OK", r#"{"state":{"on":false,"temperature":19}}"#).await;
        let cfg = config().with("port", i64::from(port));
        let mut dev = HttpJsonDevice::from_config(&cfg).unwrap();
        let payload = dev.poll().await.unwrap();
        let updates = dev.parse_response(&payload).unwrap();
        assert!(updates.contains(&ChannelUpdate::new("power", State::OnOff(false))));
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn test_non_2xx_is_api_error() {
        let port = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;
        let cfg = config().with("port", i64::from(port));
        let mut dev = HttpJsonDevice::from_config(&cfg).unwrap();
        let err = dev.poll().await.unwrap_err();
        assert!(matches!(err, DriverError::Api { code: Some(503), .. }));
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn test_malformed_json_is_protocol_error() {
        let port = serve_once("200 OK", "not json").await;
        let cfg = config().with("port", i64::from(port));
        let mut dev = HttpJsonDevice::from_config(&cfg).unwrap();
        let err = dev.poll().await.unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let cfg = config().with("port", i64::from(port));
        let mut dev = HttpJsonDevice::from_config(&cfg).unwrap();
        let err = dev.poll().await.unwrap_err();
        assert!(matches!(err, DriverError::Connection(_)));
    }
}
