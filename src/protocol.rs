//! `traffic_update` wire protocol and connection lifecycle.
//!
//! This module owns **every message that crosses the channel boundary**
//! between the signal producer and this observer.
//!
//! ## Events
//!
//! | Event             | Direction         | Payload                         |
//! |-------------------|-------------------|---------------------------------|
//! | `traffic_update`  | server → client   | [`TrafficUpdate`]               |
//! | `connect`         | transport         | *(none)*                        |
//! | `disconnect`      | transport         | reason string                   |
//! | `connect_error`   | transport         | `{"message": ..}`               |
//! | `error`           | transport         | `{"message": ..}`               |
//!
//! ## Design rules
//!
//! 1. Every struct is `Serialize + Deserialize` with snake_case JSON.
//! 2. Every optional field has a serde default; a missing count is zero,
//!    never a decode failure.
//! 3. Snapshots travel whole. There is no partial / delta message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{timestamp, Direction, IntersectionSnapshot, Location, SignalState};

// ---------------------------------------------------------------------------
// traffic_update
// ---------------------------------------------------------------------------

/// Outer envelope of a `traffic_update` push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficUpdate {
    pub intersection: IntersectionPayload,
    /// Producer clock. Absent → time of decoding.
    #[serde(default = "Utc::now", with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// The `intersection` object inside a [`TrafficUpdate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntersectionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub signals: BTreeMap<Direction, SignalState>,
}

impl From<TrafficUpdate> for IntersectionSnapshot {
    fn from(update: TrafficUpdate) -> Self {
        let TrafficUpdate {
            intersection,
            timestamp,
        } = update;
        Self {
            location: intersection.location,
            signals: intersection.signals,
            current_direction: intersection.current_direction,
            current_phase: intersection.current_phase,
            timestamp,
        }
    }
}

impl From<&IntersectionSnapshot> for TrafficUpdate {
    fn from(snapshot: &IntersectionSnapshot) -> Self {
        Self {
            intersection: IntersectionPayload {
                current_direction: snapshot.current_direction,
                current_phase: snapshot.current_phase.clone(),
                location: snapshot.location,
                signals: snapshot.signals.clone(),
            },
            timestamp: snapshot.timestamp,
        }
    }
}

/// Decode a `traffic_update` event argument into a snapshot.
pub fn decode_traffic_update(payload: serde_json::Value) -> Result<IntersectionSnapshot> {
    let update: TrafficUpdate = serde_json::from_value(payload)?;
    Ok(update.into())
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// Side-channel connection status delivered to observers.
///
/// `detail` carries the disconnect reason; `error` the most recent
/// transport error message, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            detail: None,
            error: None,
        }
    }

    pub fn connecting() -> Self {
        Self::new(ConnectionState::Connecting)
    }

    pub fn connected() -> Self {
        Self::new(ConnectionState::Connected)
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            detail: Some(reason.into()),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            state: ConnectionState::Failed,
            detail: None,
            error: Some(format!("Failed to connect to server: {message}")),
        }
    }

    /// Same state, with a socket error attached.
    pub fn with_error(&self, message: impl Into<String>) -> Self {
        Self {
            state: self.state,
            detail: self.detail.clone(),
            error: Some(format!("Socket error: {}", message.into())),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names used on the push channel, as constants.
pub mod events {
    pub const TRAFFIC_UPDATE: &str = "traffic_update";

    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
    pub const ERROR: &str = "error";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalStatus;
    use chrono::{Local, TimeZone};
    use serde_json::json;

    /// Producer wall-clock time on this host.
    fn local(h: u32, m: u32, sec: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2025, 3, 1, h, m, sec)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn producer_payload() -> serde_json::Value {
        json!({
            "intersection": {
                "current_direction": "North",
                "location": {"lat": 12.9716, "lng": 77.5946},
                "signals": {
                    "North": {
                        "status": "Green",
                        "vehicle_count": 20,
                        "last_green_time": "2025-03-01T08:00:00.000000",
                        "emergency_vehicle": false,
                        "vehicle_types": {"car": 16, "bus": 2, "truck": 2},
                        "expected_wait_time": 0
                    },
                    "South": {"status": "Red", "vehicle_count": 3, "last_green_time": null,
                              "emergency_vehicle": false,
                              "vehicle_types": {"car": 3, "bus": 0, "truck": 0},
                              "expected_wait_time": 38},
                    "East": {"status": "Red", "vehicle_count": 0, "last_green_time": null,
                             "emergency_vehicle": true,
                             "vehicle_types": {"car": 0, "bus": 0, "truck": 0},
                             "expected_wait_time": 61},
                    "West": {"status": "Red", "vehicle_count": 1, "last_green_time": null,
                             "emergency_vehicle": false,
                             "vehicle_types": {"car": 1, "bus": 0, "truck": 0},
                             "expected_wait_time": 84}
                }
            },
            "timestamp": "2025-03-01T08:00:10.000000"
        })
    }

    // -----------------------------------------------------------------------
    // traffic_update decoding
    // -----------------------------------------------------------------------

    #[test]
    fn decodes_producer_payload() {
        let snap = decode_traffic_update(producer_payload()).unwrap();
        assert_eq!(snap.current_direction, Some(Direction::North));
        assert_eq!(snap.signals.len(), 4);

        let north = snap.signal(Direction::North).unwrap();
        assert_eq!(north.status, SignalStatus::Green);
        assert_eq!(north.vehicle_count, 20);
        assert_eq!(
            north.last_green_time,
            Some(local(8, 0, 0))
        );
        assert!(snap.signal(Direction::East).unwrap().emergency_vehicle);
        assert_eq!(
            snap.timestamp,
            local(8, 0, 10)
        );
    }

    #[test]
    fn missing_location_uses_default() {
        let snap = decode_traffic_update(json!({
            "intersection": {"signals": {"West": {"status": "Green"}}},
            "timestamp": "2025-03-01T08:00:10Z"
        }))
        .unwrap();
        assert_eq!(snap.location, Location::default());
        assert!(snap.current_direction.is_none());
        assert!(snap.has_green());
    }

    #[test]
    fn missing_signals_decode_to_empty_map() {
        let snap = decode_traffic_update(json!({"intersection": {}})).unwrap();
        assert!(snap.signals.is_empty());
        assert!(!snap.has_green());
    }

    #[test]
    fn missing_intersection_is_a_decode_error() {
        assert!(decode_traffic_update(json!({"timestamp": "2025-03-01T08:00:10Z"})).is_err());
    }

    #[test]
    fn snapshot_round_trips_through_wire_form() {
        let snap = decode_traffic_update(producer_payload()).unwrap();
        let wire = serde_json::to_value(TrafficUpdate::from(&snap)).unwrap();
        let back = decode_traffic_update(wire).unwrap();
        assert_eq!(back, snap);
    }

    // -----------------------------------------------------------------------
    // Connection status
    // -----------------------------------------------------------------------

    #[test]
    fn with_error_keeps_state() {
        let status = ConnectionStatus::connected().with_error("boom");
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.error.as_deref(), Some("Socket error: boom"));
    }

    #[test]
    fn connection_state_serialises_snake_case() {
        let v = serde_json::to_value(ConnectionStatus::disconnected("io error")).unwrap();
        assert_eq!(v["state"], "disconnected");
        assert_eq!(v["detail"], "io error");
        assert!(v.get("error").is_none());
    }
}
