//! # Live Events
//!
//! Wire model for server-pushed updates. Every message on the live channel is a
//! single JSON object `{ "type": <string>, "data": <any> }`. The `type` tag
//! selects the handler in the `SubscriptionRegistry`; the `data` value is handed
//! to that handler untouched.
//!
//! `LiveEvent` is the typed view over the known tags. Unknown tags stay
//! representable as `LiveEvent::Unknown` so that a newer server never breaks an
//! older client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag of the dashboard metrics update pushed by the trading server.
pub const METRICS_UPDATE: &str = "metricsUpdate";

/// # Inbound Frame
///
/// One decoded message from the transport. Constructed per message and consumed
/// immediately by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// The event-type tag (`"type"` on the wire).
    #[serde(rename = "type")]
    pub event_type: String,
    /// The event payload (`"data"` on the wire). `null` when absent.
    #[serde(rename = "data", default)]
    pub payload: Value,
}

impl InboundFrame {
    /// Decodes a raw UTF-8 text frame.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Known event kinds, keyed in the registry by their wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Portfolio balance / positions / daily P&L refresh.
    MetricsUpdate,
}

impl EventKind {
    /// All known kinds.
    pub const ALL: [EventKind; 1] = [EventKind::MetricsUpdate];

    /// The wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MetricsUpdate => METRICS_UPDATE,
        }
    }

    /// Maps a wire tag to a known kind.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Metrics Update
///
/// Payload of `metricsUpdate`. The dashboard merges these fields into its
/// portfolio and analytics snapshot; any of them may be omitted by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsUpdate {
    /// Current account balance.
    pub balance: f64,
    /// Open positions, passed through as the server sends them.
    #[serde(default)]
    pub positions: Vec<Value>,
    /// Profit and loss for the current trading day.
    #[serde(rename = "dailyPnL", default)]
    pub daily_pnl: Option<f64>,
}

/// Typed view over an `InboundFrame`.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// A decoded `metricsUpdate`.
    MetricsUpdate(MetricsUpdate),
    /// Any tag this client does not know about.
    Unknown {
        /// The unrecognised tag.
        event_type: String,
        /// The raw payload.
        data: Value,
    },
}

impl LiveEvent {
    /// Converts a frame into its typed form. A known tag whose payload does not
    /// match the expected shape is an error; an unknown tag never is.
    pub fn from_frame(frame: InboundFrame) -> Result<Self, serde_json::Error> {
        match EventKind::from_tag(&frame.event_type) {
            Some(EventKind::MetricsUpdate) => {
                Ok(LiveEvent::MetricsUpdate(serde_json::from_value(frame.payload)?))
            }
            None => Ok(LiveEvent::Unknown {
                event_type: frame.event_type,
                data: frame.payload,
            }),
        }
    }

    /// The wire tag of this event.
    pub fn event_type(&self) -> &str {
        match self {
            LiveEvent::MetricsUpdate(_) => EventKind::MetricsUpdate.as_str(),
            LiveEvent::Unknown { event_type, .. } => event_type,
        }
    }
}
