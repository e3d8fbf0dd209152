//! Core intersection types shared across all modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Directions
// ---------------------------------------------------------------------------

/// One approach of the intersection.
///
/// Declaration order is the signal rotation order, so a `BTreeMap` keyed by
/// `Direction` iterates North → East → South → West.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// Fixed green-phase rotation.
    pub const ROTATION: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Next direction in the rotation, wrapping West → North.
    pub fn next(self) -> Self {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "North",
            Direction::East => "East",
            Direction::South => "South",
            Direction::West => "West",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Signal state
// ---------------------------------------------------------------------------

/// Lamp state of a single signal.
///
/// Anything the producer sends outside the three known values decodes as
/// `Unknown`; it is rendered grey and never counts as green.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum SignalStatus {
    Green,
    Yellow,
    Red,
    #[default]
    #[serde(other)]
    Unknown,
}

impl SignalStatus {
    pub fn is_green(self) -> bool {
        self == SignalStatus::Green
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalStatus::Green => "Green",
            SignalStatus::Yellow => "Yellow",
            SignalStatus::Red => "Red",
            SignalStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-class vehicle counts. The sum is not required to match
/// [`SignalState::vehicle_count`].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VehicleTypes {
    #[serde(default)]
    pub car: u32,
    #[serde(default)]
    pub bus: u32,
    #[serde(default)]
    pub truck: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    #[serde(default)]
    pub status: SignalStatus,
    #[serde(default)]
    pub vehicle_count: u32,
    /// Absent on some producers; read through `view::vehicle_breakdown`.
    #[serde(default)]
    pub vehicle_types: Option<VehicleTypes>,
    /// `None` iff this signal has never held green.
    #[serde(default, with = "timestamp::option")]
    pub last_green_time: Option<DateTime<Utc>>,
    /// Seconds; only meaningful while red.
    #[serde(default)]
    pub expected_wait_time: u32,
    #[serde(default)]
    pub emergency_vehicle: bool,
}

impl SignalState {
    /// A red signal with no traffic that has never been green.
    pub fn idle_red() -> Self {
        Self {
            status: SignalStatus::Red,
            vehicle_types: Some(VehicleTypes::default()),
            ..Default::default()
        }
    }

    /// A green signal with no traffic whose phase started at `since`.
    pub fn idle_green(since: DateTime<Utc>) -> Self {
        Self {
            status: SignalStatus::Green,
            vehicle_types: Some(VehicleTypes::default()),
            last_green_time: Some(since),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Bangalore – used whenever the producer omits a location.
impl Default for Location {
    fn default() -> Self {
        Self::new(12.9716, 77.5946)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lng)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One complete description of every signal at an instant.
///
/// Snapshots are only ever replaced whole; nothing merges two of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionSnapshot {
    pub location: Location,
    pub signals: BTreeMap<Direction, SignalState>,
    /// Direction holding the green phase, when the producer says so.
    pub current_direction: Option<Direction>,
    /// Free-text phase label (e.g. `"North-South"`), display only.
    pub current_phase: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl IntersectionSnapshot {
    /// The synthetic snapshot shown before the first push arrives:
    /// North/South green since `now`, East/West red, no vehicles.
    pub fn startup_default(now: DateTime<Utc>) -> Self {
        let mut signals = BTreeMap::new();
        signals.insert(Direction::North, SignalState::idle_green(now));
        signals.insert(Direction::South, SignalState::idle_green(now));
        signals.insert(Direction::East, SignalState::idle_red());
        signals.insert(Direction::West, SignalState::idle_red());

        Self {
            location: Location::default(),
            signals,
            current_direction: Some(Direction::North),
            current_phase: Some("North-South".into()),
            timestamp: now,
        }
    }

    pub fn signal(&self, direction: Direction) -> Option<&SignalState> {
        self.signals.get(&direction)
    }

    /// True if any signal is green. Snapshots failing this are invalid.
    pub fn has_green(&self) -> bool {
        self.signals.values().any(|s| s.status.is_green())
    }

    /// Green directions in rotation order.
    pub fn green_directions(&self) -> Vec<Direction> {
        self.signals
            .iter()
            .filter(|(_, s)| s.status.is_green())
            .map(|(d, _)| *d)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Timestamp decoding
// ---------------------------------------------------------------------------

/// Serde helpers for producer timestamps.
///
/// Accepts RFC 3339 (`2025-01-01T12:00:00Z`) and offset-less ISO-8601
/// (`2025-01-01T12:00:00.123456`).  The producer stamps offset-less values
/// with its local wall clock, so they are read in the local timezone of
/// this host.  Always writes RFC 3339.
pub mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        parse_in(raw, &Local)
    }

    /// Like [`parse`], reading offset-less values in `tz`.
    ///
    /// A wall-clock time skipped by a DST jump has no instant and fails; one
    /// repeated by a DST fall-back resolves to its earlier instant.
    pub fn parse_in<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        let naive = raw.parse::<NaiveDateTime>().ok()?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => s.serialize_str(&dt.to_rfc3339()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) => super::parse(&raw).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid timestamp: {raw}"))
                }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Local, TimeZone};

    #[test]
    fn rotation_is_a_four_cycle() {
        for d in Direction::ROTATION {
            assert_eq!(d.next().next().next().next(), d);
            assert_ne!(d.next(), d);
        }
    }

    #[test]
    fn btree_iterates_in_rotation_order() {
        let snap = IntersectionSnapshot::startup_default(Utc::now());
        let keys: Vec<_> = snap.signals.keys().copied().collect();
        assert_eq!(keys, Direction::ROTATION.to_vec());
    }

    #[test]
    fn startup_default_is_north_south_green() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let snap = IntersectionSnapshot::startup_default(now);
        assert!(snap.has_green());
        assert_eq!(
            snap.green_directions(),
            vec![Direction::North, Direction::South]
        );
        assert_eq!(snap.signal(Direction::East).unwrap().status, SignalStatus::Red);
        assert!(snap.signal(Direction::West).unwrap().last_green_time.is_none());
        assert_eq!(snap.signal(Direction::North).unwrap().last_green_time, Some(now));
        assert!(snap.signals.values().all(|s| s.vehicle_count == 0));
    }

    #[test]
    fn unknown_status_decodes_as_unknown() {
        let s: SignalState = serde_json::from_str(r#"{"status": "Flashing"}"#).unwrap();
        assert_eq!(s.status, SignalStatus::Unknown);
        assert!(!s.status.is_green());
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let s: SignalState = serde_json::from_str(r#"{"status": "Red"}"#).unwrap();
        assert_eq!(s.vehicle_count, 0);
        assert_eq!(s.expected_wait_time, 0);
        assert!(s.vehicle_types.is_none());
        assert!(s.last_green_time.is_none());
        assert!(!s.emergency_vehicle);
    }

    #[test]
    fn partial_vehicle_types_fill_zeros() {
        let s: SignalState =
            serde_json::from_str(r#"{"status": "Green", "vehicle_types": {"car": 4}}"#).unwrap();
        let vt = s.vehicle_types.unwrap();
        assert_eq!((vt.car, vt.bus, vt.truck), (4, 0, 0));
    }

    #[test]
    fn naive_timestamp_is_read_in_producer_zone() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let parsed = timestamp::parse_in("2026-10-16T13:44:45.229012", &ist).unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 10, 16, 8, 14, 45).unwrap()
            + chrono::Duration::microseconds(229_012);
        assert_eq!(parsed, expected);

        let whole = timestamp::parse_in("2025-03-01T08:00:12", &Utc).unwrap();
        assert_eq!(whole, Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 12).unwrap());
    }

    #[test]
    fn naive_timestamp_defaults_to_local_zone() {
        let raw = "2025-03-01T08:00:12.500000";
        let expected = Local
            .with_ymd_and_hms(2025, 3, 1, 8, 0, 12)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::milliseconds(500);
        assert_eq!(timestamp::parse(raw), Some(expected));
    }

    #[test]
    fn producer_now_round_trips_through_local_reading() {
        // What `datetime.now().isoformat()` writes on the producer host.
        let now = Utc::now();
        let raw = now
            .with_timezone(&Local)
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        let parsed = timestamp::parse(&raw).unwrap();
        assert!((parsed - now).num_milliseconds().abs() < 1);
    }

    #[test]
    fn offset_timestamp_is_normalised() {
        let parsed = timestamp::parse("2025-03-01T13:30:00+05:30").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap());
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn signal_state_round_trips() {
        let signal = SignalState {
            status: SignalStatus::Red,
            vehicle_count: 7,
            vehicle_types: Some(VehicleTypes { car: 5, bus: 1, truck: 1 }),
            last_green_time: Some(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()),
            expected_wait_time: 23,
            emergency_vehicle: true,
        };
        let json = serde_json::to_string(&signal).unwrap();
        let back: SignalState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, signal);
    }
}
