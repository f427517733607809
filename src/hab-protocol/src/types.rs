// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport DTOs for the JSON line protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hab_core::{DeviceConfig, ErrorKind, RequestError, ThingSnapshot};

/// Command received from network clients (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientCommand {
    ListThings,
    ListThingTypes,
    GetThing {
        thing: String,
    },
    SendCommand {
        thing: String,
        channel: String,
        /// Loose command value: `true`, `21.5`, `"ON"`, `"REFRESH"`, ...
        command: Value,
    },
    Refresh {
        thing: String,
    },
    Reconfigure {
        thing: String,
        #[serde(default)]
        params: DeviceConfig,
        #[serde(default)]
        refresh: Option<i64>,
    },
}

/// Envelope for client commands with optional authentication token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(flatten)]
    pub cmd: ClientCommand,
}

/// Response sent to network clients over TCP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thing: Option<ThingSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub things: Option<Vec<ThingSnapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thing_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientResponse {
    pub fn thing(snapshot: ThingSnapshot) -> Self {
        Self {
            success: true,
            thing: Some(snapshot),
            ..Self::default()
        }
    }

    pub fn things(snapshots: Vec<ThingSnapshot>) -> Self {
        Self {
            success: true,
            things: Some(snapshots),
            ..Self::default()
        }
    }

    pub fn thing_types(types: Vec<String>) -> Self {
        Self {
            success: true,
            thing_types: Some(types),
            ..Self::default()
        }
    }

    pub fn error(kind: Option<ErrorKind>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_kind: kind,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

impl From<RequestError> for ClientResponse {
    fn from(err: RequestError) -> Self {
        Self::error(Some(err.kind), err.message)
    }
}
