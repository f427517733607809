// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Connection status tracking for a single thing.
//!
//! The tracker turns request outcomes into thing status. It is binary on
//! purpose: a success puts the thing ONLINE, a failure puts it OFFLINE, and
//! a failure streak produces exactly one transition. CONFIGURATION_ERROR is
//! sticky until the thing is reconfigured.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{DriverError, ErrorKind};

/// Status of a thing as reported to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThingStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    ConfigurationError,
}

impl fmt::Display for ThingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
        };
        f.write_str(s)
    }
}

/// Reason attached to a status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusDetail {
    #[default]
    None,
    CommunicationError,
    ProtocolError,
    ApiError,
    ConfigurationError,
    Disposed,
}

impl From<ErrorKind> for StatusDetail {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Connection => Self::CommunicationError,
            ErrorKind::Protocol => Self::ProtocolError,
            ErrorKind::Api => Self::ApiError,
            ErrorKind::Configuration => Self::ConfigurationError,
            ErrorKind::InvalidCommand | ErrorKind::Unavailable => Self::None,
        }
    }
}

/// Status plus detail and a human-readable description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub status: ThingStatus,
    pub detail: StatusDetail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StatusInfo {
    pub fn new(status: ThingStatus, detail: StatusDetail, description: Option<String>) -> Self {
        Self {
            status,
            detail,
            description,
        }
    }

    pub fn online() -> Self {
        Self::new(ThingStatus::Online, StatusDetail::None, None)
    }
}

impl fmt::Display for StatusInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if self.detail != StatusDetail::None {
            write!(f, " ({:?})", self.detail)?;
        }
        if let Some(desc) = &self.description {
            write!(f, ": {}", desc)?;
        }
        Ok(())
    }
}

/// Events fed into the tracker by the thing task.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// A poll or command request completed.
    RequestSucceeded,
    /// A poll or command request failed.
    RequestFailed(DriverError),
    /// Driver could not be built from the configuration.
    ConfigurationRejected(String),
    /// New configuration accepted; start over.
    Reconfigured,
    /// Thing torn down.
    Disposed,
}

/// A status change produced by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub from: StatusInfo,
    pub to: StatusInfo,
}

/// Tracks online/offline status from request outcomes.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    info: StatusInfo,
    transition_count: u64,
    consecutive_failures: u32,
    last_transition: Option<Instant>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    /// Create a tracker in the UNKNOWN state.
    pub fn new() -> Self {
        Self {
            info: StatusInfo::default(),
            transition_count: 0,
            consecutive_failures: 0,
            last_transition: None,
        }
    }

    pub fn info(&self) -> &StatusInfo {
        &self.info
    }

    pub fn status(&self) -> ThingStatus {
        self.info.status
    }

    /// Get the number of status transitions that have occurred.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Failed requests since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Get the time since the last transition.
    pub fn time_in_state(&self) -> Option<Duration> {
        self.last_transition.map(|t| t.elapsed())
    }

    /// Process an event. Returns the transition if the status changed.
    ///
    /// Events that only refresh the detail or description of the current
    /// status update it in place and return `None`.
    pub fn process_event(&mut self, event: StatusEvent) -> Option<StatusTransition> {
        match &event {
            StatusEvent::RequestSucceeded => self.consecutive_failures = 0,
            StatusEvent::RequestFailed(_) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1)
            }
            StatusEvent::Reconfigured => self.consecutive_failures = 0,
            _ => {}
        }

        let next = self.next_info(event)?;
        if next.status == self.info.status {
            self.info = next;
            return None;
        }

        let from = std::mem::replace(&mut self.info, next);
        self.transition_count += 1;
        self.last_transition = Some(Instant::now());
        Some(StatusTransition {
            from,
            to: self.info.clone(),
        })
    }

    /// Determine the next status for an event, `None` if the event is ignored.
    fn next_info(&self, event: StatusEvent) -> Option<StatusInfo> {
        match (self.info.status, event) {
            // Configuration errors stick until reconfiguration.
            (ThingStatus::ConfigurationError, StatusEvent::RequestSucceeded)
            | (ThingStatus::ConfigurationError, StatusEvent::RequestFailed(_)) => None,

            (_, StatusEvent::RequestSucceeded) => Some(StatusInfo::online()),
            (_, StatusEvent::RequestFailed(err)) => Some(StatusInfo::new(
                ThingStatus::Offline,
                err.kind().into(),
                Some(err.to_string()),
            )),
            (_, StatusEvent::ConfigurationRejected(reason)) => Some(StatusInfo::new(
                ThingStatus::ConfigurationError,
                StatusDetail::ConfigurationError,
                Some(reason),
            )),
            (_, StatusEvent::Reconfigured) => Some(StatusInfo::default()),
            (_, StatusEvent::Disposed) => Some(StatusInfo::new(
                ThingStatus::Offline,
                StatusDetail::Disposed,
                None,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_err(msg: &str) -> StatusEvent {
        StatusEvent::RequestFailed(DriverError::connection(msg))
    }

    #[test]
    fn test_initial_state() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.status(), ThingStatus::Unknown);
        assert_eq!(tracker.transition_count(), 0);
        assert!(tracker.time_in_state().is_none());
    }

    #[test]
    fn test_unknown_to_online() {
        let mut tracker = ConnectionTracker::new();
        let t = tracker.process_event(StatusEvent::RequestSucceeded).unwrap();
        assert_eq!(t.from.status, ThingStatus::Unknown);
        assert_eq!(t.to.status, ThingStatus::Online);
        assert!(tracker.process_event(StatusEvent::RequestSucceeded).is_none());
        assert_eq!(tracker.transition_count(), 1);
    }

    #[test]
    fn test_failure_streak_transitions_once() {
        let mut tracker = ConnectionTracker::new();
        tracker.process_event(StatusEvent::RequestSucceeded);

        let t = tracker.process_event(conn_err("timeout")).unwrap();
        assert_eq!(t.to.status, ThingStatus::Offline);
        assert_eq!(t.to.detail, StatusDetail::CommunicationError);

        assert!(tracker.process_event(conn_err("timeout")).is_none());
        assert!(tracker
            .process_event(StatusEvent::RequestFailed(DriverError::protocol("garbage")))
            .is_none());
        assert_eq!(tracker.consecutive_failures(), 3);
        assert_eq!(tracker.transition_count(), 2);
        // Description follows the latest failure.
        assert_eq!(tracker.info().detail, StatusDetail::ProtocolError);
        assert!(tracker
            .info()
            .description
            .as_deref()
            .is_some_and(|d| d.contains("garbage")));

        let t = tracker.process_event(StatusEvent::RequestSucceeded).unwrap();
        assert_eq!(t.to.status, ThingStatus::Online);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn test_unknown_to_offline() {
        let mut tracker = ConnectionTracker::new();
        let t = tracker.process_event(conn_err("refused")).unwrap();
        assert_eq!(t.from.status, ThingStatus::Unknown);
        assert_eq!(t.to.status, ThingStatus::Offline);
    }

    #[test]
    fn test_configuration_error_is_sticky() {
        let mut tracker = ConnectionTracker::new();
        tracker
            .process_event(StatusEvent::ConfigurationRejected("missing host".into()))
            .unwrap();
        assert_eq!(tracker.status(), ThingStatus::ConfigurationError);

        assert!(tracker.process_event(StatusEvent::RequestSucceeded).is_none());
        assert!(tracker.process_event(conn_err("x")).is_none());
        assert_eq!(tracker.status(), ThingStatus::ConfigurationError);

        let t = tracker.process_event(StatusEvent::Reconfigured).unwrap();
        assert_eq!(t.to.status, ThingStatus::Unknown);
        tracker.process_event(StatusEvent::RequestSucceeded).unwrap();
        assert_eq!(tracker.status(), ThingStatus::Online);
    }

    #[test]
    fn test_dispose_goes_offline() {
        let mut tracker = ConnectionTracker::new();
        tracker.process_event(StatusEvent::RequestSucceeded);
        let t = tracker.process_event(StatusEvent::Disposed).unwrap();
        assert_eq!(t.to.status, ThingStatus::Offline);
        assert_eq!(t.to.detail, StatusDetail::Disposed);
    }

    #[test]
    fn test_status_serialization() {
        let info = StatusInfo::new(
            ThingStatus::ConfigurationError,
            StatusDetail::ConfigurationError,
            Some("missing host".into()),
        );
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "CONFIGURATION_ERROR");
        assert_eq!(json["detail"], "CONFIGURATION_ERROR");
        assert_eq!(info.to_string(), "CONFIGURATION_ERROR (ConfigurationError): missing host");
    }
}
