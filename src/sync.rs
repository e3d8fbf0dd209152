//! `StateSync` – single owner of the current intersection snapshot.
//!
//! Every inbound snapshot passes through [`StateSync::on_message`], which
//! either replaces the held snapshot whole and notifies observers, or drops
//! the candidate and keeps the previous one.  Connection status travels on
//! a separate side channel and never touches the snapshot.
//!
//! The struct is driven from one event loop only (no concurrent writers),
//! so it carries no locks.  Observers are called synchronously, in
//! subscription order, on every accepted snapshot.

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::protocol::ConnectionStatus;
use crate::types::IntersectionSnapshot;

// ---------------------------------------------------------------------------
// Observer plumbing
// ---------------------------------------------------------------------------

/// What an observer is told about.
#[derive(Debug, Clone, Copy)]
pub enum SyncEvent<'a> {
    /// A snapshot was accepted and is now current.
    Snapshot(&'a IntersectionSnapshot),
    /// The transport changed state.
    Connection(&'a ConnectionStatus),
}

/// Boxed observer callback.
pub type Observer = Box<dyn FnMut(&SyncEvent<'_>)>;

/// Handle returned by [`StateSync::subscribe`].
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubscriptionId(u64);

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RejectReason {
    /// `signals` was empty.
    NoSignals,
    /// No signal was green.
    NoGreenSignal,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NoSignals => f.write_str("snapshot carries no signals"),
            RejectReason::NoGreenSignal => f.write_str("no signal is green"),
        }
    }
}

/// Result of offering a candidate snapshot.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UpdateOutcome {
    /// Snapshot replaced; `duplicate` is set when it equals the one replaced.
    Accepted { duplicate: bool },
    /// Snapshot dropped; the previous one is still current.
    Rejected(RejectReason),
    /// The sync has been torn down.
    Ignored,
}

impl UpdateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UpdateOutcome::Accepted { .. })
    }
}

/// Counters for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub accepted: u64,
    pub rejected: u64,
    pub duplicates: u64,
    /// Producer timestamp of the last accepted snapshot.
    pub last_snapshot_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// StateSync
// ---------------------------------------------------------------------------

pub struct StateSync {
    current: IntersectionSnapshot,
    connection: ConnectionStatus,
    observers: Vec<(SubscriptionId, Observer)>,
    next_id: u64,
    stats: SyncStats,
    closed: bool,
}

impl StateSync {
    /// Create a sync holding `initial` until the first accepted push.
    pub fn new(initial: IntersectionSnapshot) -> Self {
        Self {
            current: initial,
            connection: ConnectionStatus::connecting(),
            observers: Vec::new(),
            next_id: 0,
            stats: SyncStats::default(),
            closed: false,
        }
    }

    /// Replace the held snapshot with a caller-supplied default.
    ///
    /// Startup only: observers are not notified and counters are untouched.
    pub fn initialize(&mut self, default_snapshot: IntersectionSnapshot) {
        self.current = default_snapshot;
    }

    /// The snapshot views should render.
    pub fn current(&self) -> &IntersectionSnapshot {
        &self.current
    }

    /// Last status reported through [`connection_status_changed`](Self::connection_status_changed).
    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    /// Offer a candidate snapshot.
    ///
    /// Rejected (no state change, no notification) when no signal is green.
    /// Accepted snapshots replace the current one whole and are delivered to
    /// every observer exactly once.  Re-delivery of an identical snapshot is
    /// accepted again.
    pub fn on_message(&mut self, candidate: IntersectionSnapshot) -> UpdateOutcome {
        if self.closed {
            return UpdateOutcome::Ignored;
        }

        if let Some(reason) = validate(&candidate) {
            self.stats.rejected += 1;
            warn!(
                "Rejected snapshot from {}: {} – keeping snapshot from {}",
                candidate.timestamp, reason, self.current.timestamp
            );
            return UpdateOutcome::Rejected(reason);
        }

        let duplicate = candidate == self.current;
        if duplicate {
            self.stats.duplicates += 1;
        }
        self.stats.accepted += 1;
        self.stats.last_snapshot_time = Some(candidate.timestamp);
        self.current = candidate;

        debug!(
            "Accepted snapshot from {} (green: {:?})",
            self.current.timestamp,
            self.current.green_directions()
        );

        let event = SyncEvent::Snapshot(&self.current);
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }

        UpdateOutcome::Accepted { duplicate }
    }

    /// Record a transport state change and tell observers.
    pub fn connection_status_changed(&mut self, status: ConnectionStatus) {
        if self.closed {
            return;
        }
        debug!("Connection status: {:?}", status.state);
        self.connection = status;

        let event = SyncEvent::Connection(&self.connection);
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&SyncEvent<'_>) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        if !self.closed {
            self.observers.push((id, Box::new(observer)));
        }
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    /// Drop every observer and stop accepting updates.
    ///
    /// The held snapshot stays readable.
    pub fn teardown(&mut self) {
        self.closed = true;
        self.observers.clear();
    }
}

/// Why `candidate` must be rejected, if it must.
pub fn validate(candidate: &IntersectionSnapshot) -> Option<RejectReason> {
    if candidate.signals.is_empty() {
        Some(RejectReason::NoSignals)
    } else if !candidate.has_green() {
        Some(RejectReason::NoGreenSignal)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
