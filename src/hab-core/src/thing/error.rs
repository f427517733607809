// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a device driver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    /// Device unreachable, timed out or the link dropped.
    #[error("connection error: {0}")]
    Connection(String),
    /// Device answered with something that could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Missing or invalid connection parameters.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Device understood the request and rejected it.
    #[error("{}", fmt_api(.code, .message))]
    Api { code: Option<i64>, message: String },
}

fn fmt_api(code: &Option<i64>, message: &str) -> String {
    match code {
        Some(code) => format!("api error {}: {}", code, message),
        None => format!("api error: {}", message),
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn api(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Api { .. } => ErrorKind::Api,
        }
    }

    /// Message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Connection(m) | Self::Protocol(m) | Self::Configuration(m) => m,
            Self::Api { message, .. } => message,
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::InvalidData => Self::Protocol(err.to_string()),
            _ => Self::Connection(err.to_string()),
        }
    }
}

/// Category of a failed thing request, as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Protocol,
    Configuration,
    Api,
    /// Command rejected before reaching the device.
    InvalidCommand,
    /// Thing has no usable driver (configuration error or disposed).
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Protocol => "protocol",
            Self::Configuration => "configuration",
            Self::Api => "api",
            Self::InvalidCommand => "invalid_command",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Error returned to whoever sent a request to a thing task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RequestError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCommand, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }
}

impl From<DriverError> for RequestError {
    fn from(err: DriverError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type RequestResult<T> = Result<T, RequestError>;
