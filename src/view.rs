//! Derived view model – display values computed from `(snapshot, now)`.
//!
//! Everything here is a pure function.  Countdowns change with the clock
//! even when the snapshot does not, so callers re-derive on a fixed render
//! tick rather than only when a push arrives.
//!
//! Missing optional data (vehicle breakdowns, timestamps) is read as zero;
//! nothing in this module fails.

use chrono::{DateTime, Duration, Utc};

use crate::protocol::{ConnectionState, ConnectionStatus};
use crate::types::{
    Direction, IntersectionSnapshot, Location, SignalState, SignalStatus, VehicleTypes,
};

// ---------------------------------------------------------------------------
// Colours
// ---------------------------------------------------------------------------

pub const GREEN: &str = "#4CAF50";
pub const AMBER: &str = "#FFC107";
pub const ORANGE: &str = "#FF9800";
pub const RED: &str = "#F44336";
pub const GREY: &str = "#9E9E9E";

pub fn signal_color(status: SignalStatus) -> &'static str {
    match status {
        SignalStatus::Green => GREEN,
        SignalStatus::Yellow => AMBER,
        SignalStatus::Red => RED,
        SignalStatus::Unknown => GREY,
    }
}

/// Coarse congestion level as labelled by the producer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrafficLevel {
    Low,
    Medium,
    High,
    VeryHigh,
    Unknown,
}

impl From<&str> for TrafficLevel {
    fn from(label: &str) -> Self {
        match label {
            "Low" => TrafficLevel::Low,
            "Medium" => TrafficLevel::Medium,
            "High" => TrafficLevel::High,
            "Very High" => TrafficLevel::VeryHigh,
            _ => TrafficLevel::Unknown,
        }
    }
}

pub fn traffic_level_color(level: TrafficLevel) -> &'static str {
    match level {
        TrafficLevel::Low => GREEN,
        TrafficLevel::Medium => AMBER,
        TrafficLevel::High => ORANGE,
        TrafficLevel::VeryHigh => RED,
        TrafficLevel::Unknown => GREY,
    }
}

/// Queue length bucket used to colour vehicle counts.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn color(self) -> &'static str {
        match self {
            Severity::Low => GREEN,
            Severity::Medium => AMBER,
            Severity::High => RED,
        }
    }
}

pub fn vehicle_count_severity(count: u32) -> Severity {
    if count > 15 {
        Severity::High
    } else if count > 5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Estimated green-phase length in seconds for a queue of `vehicle_count`.
///
/// Display estimate only; the producer owns real timing.
pub fn green_duration(vehicle_count: u32) -> i64 {
    if vehicle_count > 15 {
        35
    } else if vehicle_count > 5 {
        20
    } else {
        10
    }
}

/// Whole seconds of green left, floored at zero.
///
/// Zero unless the signal is green and has a `last_green_time`.
pub fn time_remaining(signal: &SignalState, now: DateTime<Utc>) -> u64 {
    if signal.status != SignalStatus::Green {
        return 0;
    }
    let Some(since) = signal.last_green_time else {
        return 0;
    };

    let elapsed_ms = (now - since).num_milliseconds();
    let remaining_ms = green_duration(signal.vehicle_count)
        .saturating_mul(1000)
        .saturating_sub(elapsed_ms);
    remaining_ms.div_euclid(1000).max(0) as u64
}

/// Seconds since the signal was last green, truncated toward zero.
///
/// Zero unless the signal is red and has a `last_green_time`.  Not floored:
/// a `last_green_time` ahead of `now` gives a negative value.
pub fn wait_time(signal: &SignalState, now: DateTime<Utc>) -> i64 {
    if signal.status != SignalStatus::Red {
        return 0;
    }
    match signal.last_green_time {
        Some(since) => (now - since).num_milliseconds() / 1000,
        None => 0,
    }
}

pub fn next_direction(current: Direction) -> Direction {
    current.next()
}

/// `0 → "0s"`, `45 → "45s"`, `65 → "1m 5s"`.
pub fn format_duration(seconds: i64) -> String {
    if seconds == 0 {
        return "0s".into();
    }
    let minutes = seconds.div_euclid(60);
    let secs = seconds % 60;
    if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

// ---------------------------------------------------------------------------
// Snapshot-level helpers
// ---------------------------------------------------------------------------

/// `current_direction`, or the first green signal in rotation order.
pub fn active_direction(snapshot: &IntersectionSnapshot) -> Option<Direction> {
    snapshot.current_direction.or_else(|| {
        Direction::ROTATION
            .into_iter()
            .find(|d| snapshot.signal(*d).is_some_and(|s| s.status.is_green()))
    })
}

/// Vehicle classes with zeros substituted for an absent breakdown.
pub fn vehicle_breakdown(signal: &SignalState) -> VehicleTypes {
    signal.vehicle_types.unwrap_or_default()
}

const MARKER_OFFSET_DEG: f64 = 0.001;

/// Map position of the marker for `direction` around the intersection.
pub fn marker_position(location: Location, direction: Direction) -> Location {
    match direction {
        Direction::North => Location::new(location.lat + MARKER_OFFSET_DEG, location.lng),
        Direction::South => Location::new(location.lat - MARKER_OFFSET_DEG, location.lng),
        Direction::East => Location::new(location.lat, location.lng + MARKER_OFFSET_DEG),
        Direction::West => Location::new(location.lat, location.lng - MARKER_OFFSET_DEG),
    }
}

/// True when the snapshot is older than `threshold`.
pub fn is_stale(snapshot: &IntersectionSnapshot, now: DateTime<Utc>, threshold: Duration) -> bool {
    now - snapshot.timestamp > threshold
}

pub fn rotation_label() -> String {
    Direction::ROTATION
        .iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Human-readable connection line for the status bar.
pub fn status_line(status: &ConnectionStatus) -> String {
    match status.state {
        ConnectionState::Connecting => "Connecting...".into(),
        ConnectionState::Connected => "Connected successfully".into(),
        ConnectionState::Disconnected => match &status.detail {
            Some(reason) => format!("Disconnected ({reason}) - Attempting to reconnect..."),
            None => "Disconnected - Attempting to reconnect...".into(),
        },
        ConnectionState::Failed => "Connection failed".into(),
    }
}

// ---------------------------------------------------------------------------
// Assembled view
// ---------------------------------------------------------------------------

/// Display-ready record for one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalCard {
    pub direction: Direction,
    pub status: SignalStatus,
    pub color: &'static str,
    pub vehicle_count: u32,
    pub severity: Severity,
    pub breakdown: VehicleTypes,
    /// Formatted countdown, green signals only.
    pub time_remaining: Option<String>,
    /// Formatted producer estimate, red signals only.
    pub expected_wait: Option<String>,
    /// Seconds since last green (red signals), see [`wait_time`].
    pub waited: i64,
    pub emergency: bool,
    /// This direction holds the phase.
    pub active: bool,
    pub marker: Location,
}

impl SignalCard {
    pub fn derive(
        direction: Direction,
        signal: &SignalState,
        location: Location,
        active: Option<Direction>,
        now: DateTime<Utc>,
    ) -> Self {
        let remaining = (signal.status == SignalStatus::Green)
            .then(|| format_duration(time_remaining(signal, now) as i64));
        let expected_wait = (signal.status == SignalStatus::Red)
            .then(|| format_duration(i64::from(signal.expected_wait_time)));

        Self {
            direction,
            status: signal.status,
            color: signal_color(signal.status),
            vehicle_count: signal.vehicle_count,
            severity: vehicle_count_severity(signal.vehicle_count),
            breakdown: vehicle_breakdown(signal),
            time_remaining: remaining,
            expected_wait,
            waited: wait_time(signal, now),
            emergency: signal.emergency_vehicle,
            active: active == Some(direction),
            marker: marker_position(location, direction),
        }
    }
}

/// Everything a dashboard or map surface needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub active_direction: Option<Direction>,
    pub next_direction: Option<Direction>,
    pub rotation: String,
    pub phase: Option<String>,
    pub location: Location,
    pub status_line: String,
    pub connected: bool,
    pub error: Option<String>,
    pub stale: bool,
    pub last_update: DateTime<Utc>,
    /// Cards in rotation order, for the directions present.
    pub signals: Vec<SignalCard>,
}

impl DashboardView {
    pub fn derive(
        snapshot: &IntersectionSnapshot,
        connection: &ConnectionStatus,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Self {
        let active = active_direction(snapshot);
        let signals = snapshot
            .signals
            .iter()
            .map(|(dir, sig)| SignalCard::derive(*dir, sig, snapshot.location, active, now))
            .collect();

        Self {
            active_direction: active,
            next_direction: active.map(next_direction),
            rotation: rotation_label(),
            phase: snapshot.current_phase.clone(),
            location: snapshot.location,
            status_line: status_line(connection),
            connected: connection.is_connected(),
            error: connection.error.clone(),
            stale: is_stale(snapshot, now, stale_after),
            last_update: snapshot.timestamp,
            signals,
        }
    }

    pub fn card(&self, direction: Direction) -> Option<&SignalCard> {
        self.signals.iter().find(|c| c.direction == direction)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
