//! `DashboardClient` – owns the [`StateSync`] and the transport bridge.
//!
//! ## Usage
//!
//! ```no_run
//! use signal_dashboard::{render_dashboard, DashboardClient, DashboardConfig};
//!
//! # async fn demo() -> signal_dashboard::Result<()> {
//! let mut client = DashboardClient::new(DashboardConfig::default());
//! client.subscribe(|event| log::debug!("{event:?}"));
//! client.run(|view| println!("{}", render_dashboard(view))).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Events are applied in delivery order on the caller's task.  Views are
//! re-derived from `(current snapshot, now)` on every render tick, so
//! countdowns keep moving between pushes.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::future::Future;
use tokio::time::MissedTickBehavior;

use crate::bridge::{self, BridgeConfig, BridgeHandle, BridgeStats};
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::events::DashboardEvent;
use crate::protocol::ConnectionStatus;
use crate::sync::{StateSync, SubscriptionId, SyncEvent, UpdateOutcome};
use crate::types::IntersectionSnapshot;
use crate::view::DashboardView;

// ---------------------------------------------------------------------------
// DashboardClient
// ---------------------------------------------------------------------------

pub struct DashboardClient {
    config: DashboardConfig,
    sync: StateSync,
    bridge: Option<BridgeHandle>,
}

impl DashboardClient {
    /// Create a client showing the startup default until the first push.
    /// Nothing connects until [`connect`](Self::connect) or
    /// [`run`](Self::run).
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config,
            sync: StateSync::new(IntersectionSnapshot::startup_default(Utc::now())),
            bridge: None,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Spawn the transport bridge.  Must be called inside a tokio runtime.
    /// A second call while a bridge is alive is a no-op.
    pub fn connect(&mut self) -> Result<()> {
        if self.bridge.as_ref().is_some_and(BridgeHandle::is_alive) {
            return Ok(());
        }
        let bridge_config = BridgeConfig::from_config(&self.config)?;
        info!("Connecting to {}", bridge_config.url);
        self.bridge = Some(bridge::spawn(bridge_config));
        Ok(())
    }

    /// Stop the bridge and tear the sync down.  No observer fires after
    /// this returns; the last snapshot stays readable.
    pub fn disconnect(&mut self) {
        if let Some(mut bridge) = self.bridge.take() {
            bridge.disconnect();
        }
        self.sync.teardown();
        info!("Dashboard client disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.bridge.as_ref().is_some_and(BridgeHandle::is_connected)
    }

    pub fn bridge_stats(&self) -> Option<BridgeStats> {
        self.bridge.as_ref().map(BridgeHandle::stats)
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn sync(&self) -> &StateSync {
        &self.sync
    }

    pub fn current(&self) -> &IntersectionSnapshot {
        self.sync.current()
    }

    pub fn connection(&self) -> &ConnectionStatus {
        self.sync.connection()
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&SyncEvent<'_>) + 'static,
    {
        self.sync.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.sync.unsubscribe(id)
    }

    /// Derived view of the current snapshot at `now`.
    pub fn view(&self, now: DateTime<Utc>) -> DashboardView {
        DashboardView::derive(
            self.sync.current(),
            self.sync.connection(),
            now,
            self.config.stale_after(),
        )
    }

    // -----------------------------------------------------------------------
    // Event application
    // -----------------------------------------------------------------------

    /// Apply one bridge event.  Returns the sync outcome for data events.
    pub fn apply_event(&mut self, event: DashboardEvent) -> Option<UpdateOutcome> {
        match event {
            DashboardEvent::TrafficUpdate(snapshot) => return Some(self.sync.on_message(snapshot)),
            DashboardEvent::Connecting { attempt } => {
                // The status line keeps showing the previous loss until
                // the next connect succeeds or fails.
                debug!("Connection attempt {attempt}");
            }
            DashboardEvent::Connected { sid } => {
                info!("Connected (sid {})", sid.as_deref().unwrap_or("-"));
                self.sync
                    .connection_status_changed(ConnectionStatus::connected());
            }
            DashboardEvent::Disconnected { reason } => {
                warn!("Disconnected: {reason}");
                self.sync
                    .connection_status_changed(ConnectionStatus::disconnected(reason));
            }
            DashboardEvent::ConnectError { message } => {
                self.sync
                    .connection_status_changed(ConnectionStatus::failed(message));
            }
            DashboardEvent::Error { message } => {
                let status = self.sync.connection().with_error(message);
                self.sync.connection_status_changed(status);
            }
            DashboardEvent::GaveUp { attempts } => {
                warn!("Giving up after {attempts} connection attempts");
                self.sync.connection_status_changed(ConnectionStatus::failed(format!(
                    "gave up after {attempts} attempts"
                )));
            }
        }
        None
    }

    /// Drain and apply everything the bridge has queued.  Returns how many
    /// events were applied.
    pub fn poll(&mut self) -> usize {
        let Some(bridge) = self.bridge.as_mut() else {
            return 0;
        };
        let pending = bridge.poll();
        let n = pending.len();
        for event in pending {
            self.apply_event(event);
        }
        n
    }

    // -----------------------------------------------------------------------
    // Render loop
    // -----------------------------------------------------------------------

    /// Run until Ctrl-C, calling `render` on every tick.
    pub async fn run<F>(&mut self, render: F) -> Result<()>
    where
        F: FnMut(&DashboardView),
    {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl-C handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
            info!("Dashboard shutting down (SIGINT)");
        };
        self.run_until(render, shutdown).await
    }

    /// Run until `shutdown` resolves or the bridge stops for good.
    ///
    /// Connects if needed.  Renders once on start, on every tick, and once
    /// more when the bridge stops.  Always ends with [`disconnect`](Self::disconnect).
    pub async fn run_until<F, S>(&mut self, mut render: F, shutdown: S) -> Result<()>
    where
        F: FnMut(&DashboardView),
        S: Future<Output = ()>,
    {
        self.connect()?;

        let mut tick = tokio::time::interval(self.config.render_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = next_event(&mut self.bridge) => match event {
                    Some(event) => {
                        self.apply_event(event);
                    }
                    None => {
                        info!("Bridge stopped");
                        render(&self.view(Utc::now()));
                        break;
                    }
                },
                _ = tick.tick() => render(&self.view(Utc::now())),
                _ = &mut shutdown => break,
            }
        }

        self.disconnect();
        Ok(())
    }
}

impl Drop for DashboardClient {
    fn drop(&mut self) {
        if let Some(mut bridge) = self.bridge.take() {
            bridge.disconnect();
        }
    }
}

async fn next_event(bridge: &mut Option<BridgeHandle>) -> Option<DashboardEvent> {
    match bridge {
        Some(bridge) => bridge.recv().await,
        None => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionState;
    use crate::sync::RejectReason;
    use crate::types::{Direction, SignalState, SignalStatus};
    use chrono::Duration;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn all_red(now: DateTime<Utc>) -> IntersectionSnapshot {
        let mut snap = IntersectionSnapshot::startup_default(now);
        for signal in snap.signals.values_mut() {
            *signal = SignalState::idle_red();
        }
        snap
    }

    fn east_green(now: DateTime<Utc>) -> IntersectionSnapshot {
        let mut snap = all_red(now);
        *snap.signals.get_mut(&Direction::East).unwrap() = SignalState::idle_green(now);
        snap.current_direction = Some(Direction::East);
        snap
    }

    // -----------------------------------------------------------------------
    // Lifecycle events
    // -----------------------------------------------------------------------

    #[test]
    fn lifecycle_events_drive_connection_status() {
        let mut client = DashboardClient::new(DashboardConfig::default());
        assert_eq!(client.connection().state, ConnectionState::Connecting);

        client.apply_event(DashboardEvent::Connected { sid: Some("a".into()) });
        assert!(client.connection().is_connected());

        client.apply_event(DashboardEvent::Error {
            message: "frame too large".into(),
        });
        assert_eq!(client.connection().state, ConnectionState::Connected);
        assert_eq!(
            client.connection().error.as_deref(),
            Some("Socket error: frame too large")
        );

        client.apply_event(DashboardEvent::Disconnected {
            reason: "transport close".into(),
        });
        client.apply_event(DashboardEvent::Connecting { attempt: 1 });
        assert_eq!(client.connection().state, ConnectionState::Disconnected);
        assert_eq!(
            client.view(Utc::now()).status_line,
            "Disconnected (transport close) - Attempting to reconnect..."
        );

        client.apply_event(DashboardEvent::GaveUp { attempts: 3 });
        assert_eq!(client.connection().state, ConnectionState::Failed);
    }

    // -----------------------------------------------------------------------
    // Data events
    // -----------------------------------------------------------------------

    #[test]
    fn traffic_updates_go_through_the_gate() {
        let t0 = Utc::now();
        let mut client = DashboardClient::new(DashboardConfig::default());
        let seen = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&seen);
        client.subscribe(move |event| {
            if matches!(event, SyncEvent::Snapshot(_)) {
                *counter.borrow_mut() += 1;
            }
        });

        let outcome = client.apply_event(DashboardEvent::TrafficUpdate(east_green(t0)));
        assert!(outcome.unwrap().is_accepted());
        assert_eq!(client.view(t0).active_direction, Some(Direction::East));

        let outcome = client.apply_event(DashboardEvent::TrafficUpdate(all_red(t0)));
        assert_eq!(
            outcome,
            Some(UpdateOutcome::Rejected(RejectReason::NoGreenSignal))
        );
        assert_eq!(
            client.current().signal(Direction::East).unwrap().status,
            SignalStatus::Green
        );
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn view_goes_stale_without_updates() {
        let client = DashboardClient::new(DashboardConfig::default());
        let ts = client.current().timestamp;
        assert!(!client.view(ts + Duration::seconds(1)).stale);
        assert!(client.view(ts + Duration::seconds(30)).stale);
    }

    #[test]
    fn disconnect_stops_notifications() {
        let t0 = Utc::now();
        let mut client = DashboardClient::new(DashboardConfig::default());
        let seen = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&seen);
        client.subscribe(move |_| *counter.borrow_mut() += 1);

        client.disconnect();
        assert_eq!(
            client.apply_event(DashboardEvent::TrafficUpdate(east_green(t0))),
            Some(UpdateOutcome::Ignored)
        );
        client.apply_event(DashboardEvent::Connected { sid: None });
        assert_eq!(*seen.borrow(), 0);
        assert!(client.sync().is_closed());
        assert_eq!(client.poll(), 0);
    }

    // -----------------------------------------------------------------------
    // Render loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn run_until_renders_and_stops_when_bridge_gives_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = DashboardClient::new(DashboardConfig {
            endpoint: format!("http://{addr}"),
            reconnect_delay_ms: 10,
            max_reconnect_attempts: Some(1),
            render_interval_ms: 10,
            ..Default::default()
        });

        let mut frames = 0;
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.run_until(|_| frames += 1, std::future::pending()),
        )
        .await
        .unwrap();
        tokio_test::assert_ok!(result);

        assert!(frames >= 1);
        assert_eq!(client.connection().state, ConnectionState::Failed);
        assert!(client.sync().is_closed());
    }
}
