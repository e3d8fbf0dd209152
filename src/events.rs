//! Semantic dashboard events delivered from the transport bridge.
//!
//! The bridge translates raw Socket.IO frames into these types and queues
//! them for the client, which applies them to its [`StateSync`] on its own
//! task.  Nothing here touches the network.
//!
//! [`StateSync`]: crate::sync::StateSync

use crate::protocol::events;
use crate::types::IntersectionSnapshot;

/// A single semantic dashboard event.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------
    /// A connection attempt is starting.  `attempt` counts from 1 and
    /// resets after every successful connect.
    Connecting { attempt: u32 },
    /// Namespace joined.
    Connected { sid: Option<String> },
    /// Transport lost.  `reason` is human-readable.
    Disconnected { reason: String },
    /// Connect attempt failed or the server refused the namespace.
    ConnectError { message: String },
    /// Non-fatal transport error while connected.
    Error { message: String },
    /// Reconnect budget exhausted; the bridge has stopped.
    GaveUp { attempts: u32 },

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------
    /// Decoded `traffic_update` payload, not yet validated.
    TrafficUpdate(IntersectionSnapshot),
}

impl DashboardEvent {
    /// Socket.IO event name this event corresponds to, where one exists.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Connecting { .. } | Self::GaveUp { .. } => None,
            Self::Connected { .. } => Some(events::CONNECT),
            Self::Disconnected { .. } => Some(events::DISCONNECT),
            Self::ConnectError { .. } => Some(events::CONNECT_ERROR),
            Self::Error { .. } => Some(events::ERROR),
            Self::TrafficUpdate(_) => Some(events::TRAFFIC_UPDATE),
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, Self::TrafficUpdate(_))
    }
}
