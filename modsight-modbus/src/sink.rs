//! Outbound side of a read point: channel updates and status reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::value::ChannelValue;

/// Timestamp channels updated once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marker {
    /// Set after every successful decode cycle.
    #[serde(rename = "lastSuccess")]
    LastSuccess,
    /// Set after every read error.
    #[serde(rename = "lastError")]
    LastError,
}

impl Marker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::LastSuccess => "lastSuccess",
            Marker::LastError => "lastError",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a reported fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A bridge in the chain is missing, offline or not polling.
    BridgeOffline,
    /// The read point configuration cannot work with its poller.
    ConfigurationError,
    /// The transport reported a failed read.
    CommunicationError,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::BridgeOffline => write!(f, "bridge offline"),
            FaultKind::ConfigurationError => write!(f, "configuration error"),
            FaultKind::CommunicationError => write!(f, "communication error"),
        }
    }
}

/// Receiver of everything a dispatcher makes externally visible.
///
/// Calls from one dispatcher are serialized and arrive in the order its
/// states changed. Neither its configuration nor its cache lock is held, so
/// implementations may query state, but must not activate, deactivate or
/// re-validate the calling dispatcher.
pub trait UpdateSink: Send + Sync {
    fn publish_channel_value(&self, channel_id: &str, value: &ChannelValue);

    fn publish_marker(&self, marker: Marker, timestamp: DateTime<Utc>);

    fn report_fault(&self, kind: FaultKind, message: &str);

    fn report_ready(&self);
}

/// One call made on an [`UpdateSink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    ChannelValue {
        channel: String,
        value: ChannelValue,
    },
    Marker {
        marker: Marker,
        timestamp: DateTime<Utc>,
    },
    Fault {
        kind: FaultKind,
        message: String,
    },
    Ready,
}

/// [`UpdateSink`] that keeps every event and traces it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events so far, oldest first.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().clone()
    }

    /// Drain all events so far.
    pub fn take(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Published channel values, oldest first.
    pub fn channel_values(&self) -> Vec<(String, ChannelValue)> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::ChannelValue { channel, value } => Some((channel.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Most recent status report (`Fault` or `Ready`).
    pub fn last_status(&self) -> Option<SinkEvent> {
        self.lock()
            .iter()
            .rev()
            .find(|event| matches!(event, SinkEvent::Fault { .. } | SinkEvent::Ready))
            .cloned()
    }

    fn push(&self, event: SinkEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SinkEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UpdateSink for RecordingSink {
    fn publish_channel_value(&self, channel_id: &str, value: &ChannelValue) {
        debug!("Channel '{}' = {}", channel_id, value);
        self.push(SinkEvent::ChannelValue {
            channel: channel_id.to_string(),
            value: value.clone(),
        });
    }

    fn publish_marker(&self, marker: Marker, timestamp: DateTime<Utc>) {
        debug!("Marker '{}' = {}", marker, timestamp.to_rfc3339());
        self.push(SinkEvent::Marker { marker, timestamp });
    }

    fn report_fault(&self, kind: FaultKind, message: &str) {
        warn!("Read point fault ({}): {}", kind, message);
        self.push(SinkEvent::Fault {
            kind,
            message: message.to_string(),
        });
    }

    fn report_ready(&self) {
        info!("Read point ready");
        self.push(SinkEvent::Ready);
    }
}

/// A published channel value as emitted by the command-line reader.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelUpdate {
    /// Unix epoch milliseconds of the decode cycle.
    pub timestamp: i64,

    /// Read point identifier.
    pub read_point: String,

    pub channel: String,

    pub value: ChannelValue,
}

impl ChannelUpdate {
    pub fn new(
        read_point: impl Into<String>,
        channel: impl Into<String>,
        value: ChannelValue,
    ) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            read_point: read_point.into(),
            channel: channel.into(),
            value,
        }
    }
}
