//! Signal Dashboard
//!
//! A live observer for a single four-way intersection.  A producer pushes
//! complete snapshots of every signal over Socket.IO; this crate validates
//! each one, holds the last good snapshot, and derives every displayed value
//! (countdowns, waits, colours, rotation) from `(snapshot, now)`.
//!
//! ## Architecture
//!
//! ```text
//! signal-dashboard (bin)
//!   └── DashboardClient  (client.rs)   drains events, render tick
//!         ├── BridgeHandle (bridge.rs) WebSocket task, reconnect
//!         │     └── socketio.rs        Engine.IO / Socket.IO framing
//!         ├── StateSync    (sync.rs)   snapshot + observers + gate
//!         └── DashboardView (view.rs)  derived values → render.rs
//! types.rs / protocol.rs               domain + wire types
//! ```
//!
//! Everything except `bridge` and `client` is synchronous and available
//! without the `client` feature.

// Core modules are always available (no client feature needed).
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod render;
pub mod socketio;
pub mod sync;
pub mod types;
pub mod view;

// Async transport and client require the `client` feature.
#[cfg(feature = "client")]
pub mod bridge;
#[cfg(feature = "client")]
pub mod client;

// Convenience re-exports (client only)
#[cfg(feature = "client")]
pub use crate::bridge::{BridgeConfig, BridgeHandle, BridgeStats};
#[cfg(feature = "client")]
pub use crate::client::DashboardClient;

pub use crate::config::DashboardConfig;
pub use crate::error::{DashboardError, Result};
pub use crate::events::DashboardEvent;
pub use crate::protocol::{ConnectionState, ConnectionStatus, TrafficUpdate};
pub use crate::render::render_dashboard;
pub use crate::sync::{RejectReason, StateSync, SubscriptionId, SyncEvent, SyncStats, UpdateOutcome};
pub use crate::types::{Direction, IntersectionSnapshot, Location, SignalState, SignalStatus, VehicleTypes};
pub use crate::view::{DashboardView, SignalCard};
