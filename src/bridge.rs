//! Transport bridge – tokio task owning the Socket.IO WebSocket.
//!
//! ## Task model
//!
//! ```text
//! Client task                 │  Bridge task (tokio::spawn)
//! ─────────────────────────── │ ──────────────────────────────
//! DashboardClient::run        │ run_bridge()
//!   → handle.recv().await     │   connect_async(socket_url)
//!   → sync.on_message(..)     │   "0{open}"  → send "40"
//!   → sync.connection_..(..)  │   "40{sid}"  → Connected
//!                             │   "2"        → send "3"
//!                             │   "42[..]"   → TrafficUpdate
//!                             │   lost       → Disconnected, sleep, retry
//! ```
//!
//! The bridge never touches [`StateSync`](crate::sync::StateSync); it only
//! produces [`DashboardEvent`]s on a bounded channel.  When the channel is
//! full a traffic update is dropped with a warning; lifecycle events wait.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::events::DashboardEvent;
use crate::protocol::{decode_traffic_update, events};
use crate::socketio::{self, EngineOp, SocketOp};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Full WebSocket URL, see [`socketio::socket_url`].
    pub url: String,
    /// Fixed delay between attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts before giving up; `None` retries
    /// forever.  `Some(0)` behaves like `Some(1)`.
    pub max_reconnect_attempts: Option<u32>,
    pub connect_timeout: Duration,
    /// How deep to buffer events before dropping traffic updates.
    pub event_buffer: usize,
}

impl BridgeConfig {
    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            url: config.socket_url()?,
            reconnect_delay: config.reconnect_delay(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            connect_timeout: config.connect_timeout(),
            event_buffer: config.event_buffer.max(1),
        })
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5000/socket.io/?EIO=4&transport=websocket".into(),
            reconnect_delay: Duration::from_millis(1000),
            max_reconnect_attempts: None,
            connect_timeout: Duration::from_secs(10),
            event_buffer: 1024,
        }
    }
}

/// Counters kept by the bridge task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub connects: u64,
    pub disconnects: u64,
    pub failed_attempts: u64,
    pub updates: u64,
    /// `traffic_update` payloads that did not decode.
    pub decode_failures: u64,
    /// Traffic updates lost to a full channel.
    pub dropped_events: u64,
}

#[derive(Debug, Default)]
struct Shared {
    connected: bool,
    stats: BridgeStats,
}

// ---------------------------------------------------------------------------
// Handle (given to the client)
// ---------------------------------------------------------------------------

/// Owned by [`DashboardClient`](crate::client::DashboardClient).
pub struct BridgeHandle {
    events: mpsc::Receiver<DashboardEvent>,
    shared: Arc<Mutex<Shared>>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    /// Wait for the next event.  `None` once the bridge has stopped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<DashboardEvent> {
        self.events.recv().await
    }

    /// Drain all pending events without blocking.
    pub fn poll(&mut self) -> Vec<DashboardEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(ev) => out.push(ev),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// `false` once the task returned (reconnect budget spent) or was
    /// aborted.
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stats(&self) -> BridgeStats {
        self.shared.lock().stats.clone()
    }

    /// Stop the task and close the channel.  Idempotent.
    pub fn disconnect(&mut self) {
        self.task.abort();
        self.events.close();
        self.shared.lock().connected = false;
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Spawning the bridge task
// ---------------------------------------------------------------------------

/// Spawn the bridge on the current tokio runtime.
pub fn spawn(config: BridgeConfig) -> BridgeHandle {
    // `wss://` handshakes need a process-wide rustls provider.  Err only
    // means one is installed already.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
    let shared = Arc::new(Mutex::new(Shared::default()));
    let emitter = Emitter {
        tx,
        shared: Arc::clone(&shared),
    };

    let task = tokio::spawn(run_bridge(config, emitter));

    BridgeHandle {
        events: rx,
        shared,
        task,
    }
}

struct Emitter {
    tx: mpsc::Sender<DashboardEvent>,
    shared: Arc<Mutex<Shared>>,
}

impl Emitter {
    /// Queue an event.  Returns `false` when the receiver is gone.
    ///
    /// Lifecycle events wait for room; a traffic update is dropped when
    /// the channel is full, since the next push supersedes it.
    async fn emit(&self, event: DashboardEvent) -> bool {
        if event.is_lifecycle() {
            return self.tx.send(event).await.is_ok();
        }
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(ev)) => {
                warn!(event = ?ev.name(), "event channel full, dropping event");
                self.shared.lock().stats.dropped_events += 1;
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn set_connected(&self, connected: bool) {
        let mut shared = self.shared.lock();
        if connected && !shared.connected {
            shared.stats.connects += 1;
        } else if !connected && shared.connected {
            shared.stats.disconnects += 1;
        }
        shared.connected = connected;
    }

    fn bump(&self, f: impl FnOnce(&mut BridgeStats)) {
        f(&mut self.shared.lock().stats);
    }
}

// ---------------------------------------------------------------------------
// Async bridge implementation
// ---------------------------------------------------------------------------

/// How one connection attempt ended.
enum SessionEnd {
    /// Namespace was joined, then lost.  Carries the disconnect reason.
    Lost(String),
    /// Never got as far as a joined namespace.
    Failed(String),
    /// Receiver dropped; stop for good.
    Abandoned,
}

async fn run_bridge(config: BridgeConfig, out: Emitter) {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if !out.emit(DashboardEvent::Connecting { attempt }).await {
            break;
        }
        info!(url = %config.url, attempt, "connecting");

        match session(&config, &out).await {
            SessionEnd::Lost(reason) => {
                out.set_connected(false);
                attempt = 0;
                warn!(reason = %reason, "disconnected");
                if !out.emit(DashboardEvent::Disconnected { reason }).await {
                    break;
                }
            }
            SessionEnd::Failed(message) => {
                out.bump(|s| s.failed_attempts += 1);
                warn!(attempt, error = %message, "connect attempt failed");
                if !out.emit(DashboardEvent::ConnectError { message }).await {
                    break;
                }
            }
            SessionEnd::Abandoned => break,
        }

        if let Some(max) = config.max_reconnect_attempts {
            if attempt >= max {
                warn!(attempts = attempt, "reconnect attempts exhausted");
                out.emit(DashboardEvent::GaveUp { attempts: attempt }).await;
                break;
            }
        }
        if out.closed() {
            break;
        }

        debug!(delay_ms = config.reconnect_delay.as_millis() as u64, "waiting before reconnect");
        tokio::time::sleep(config.reconnect_delay).await;
    }

    out.set_connected(false);
    info!("bridge stopped");
}

async fn open_socket(config: &BridgeConfig) -> Result<WsStream> {
    let connect = connect_async(config.url.as_str());
    match tokio::time::timeout(config.connect_timeout, connect).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(DashboardError::Transport(e)),
        Err(_) => Err(DashboardError::Transport(tungstenite::Error::Io(
            std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
        ))),
    }
}

/// Drive one WebSocket from connect to loss.
async fn session(config: &BridgeConfig, out: &Emitter) -> SessionEnd {
    let mut ws = match open_socket(config).await {
        Ok(ws) => ws,
        Err(e) => return SessionEnd::Failed(e.to_string()),
    };

    let mut joined = false;
    // Until the open packet tells us otherwise, give the handshake the
    // connect budget.
    let mut liveness = config.connect_timeout;

    let end = loop {
        let frame = match tokio::time::timeout(liveness, ws.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                if !joined {
                    break SessionEnd::Failed(e.to_string());
                }
                out.emit(DashboardEvent::Error {
                    message: e.to_string(),
                })
                .await;
                break SessionEnd::Lost("transport error".into());
            }
            Ok(None) => break end_of(joined, "transport close"),
            Err(_) => break end_of(joined, "ping timeout"),
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break end_of(joined, "transport close"),
            // Binary attachments are not used by this producer.
            _ => continue,
        };

        let op = match socketio::parse_frame(&text) {
            Ok(op) => op,
            Err(e) => {
                warn!(error = %e, "unparseable frame");
                continue;
            }
        };

        match op {
            EngineOp::Open {
                sid,
                ping_interval,
                ping_timeout,
            } => {
                debug!(sid = %sid, ping_interval, ping_timeout, "engine.io open");
                liveness = Duration::from_millis(ping_interval + ping_timeout);
                if let Err(e) = ws.send(Message::Text(socketio::connect_frame())).await {
                    break SessionEnd::Failed(e.to_string());
                }
            }
            EngineOp::Ping => {
                if let Err(e) = ws.send(Message::Text(socketio::pong_frame())).await {
                    break end_of(joined, &e.to_string());
                }
            }
            EngineOp::Close => break end_of(joined, "transport close"),
            EngineOp::Pong | EngineOp::Noop => {}
            EngineOp::Message(SocketOp::Connect { sid }) => {
                joined = true;
                out.set_connected(true);
                info!(sid = ?sid, "connected");
                if !out.emit(DashboardEvent::Connected { sid }).await {
                    break SessionEnd::Abandoned;
                }
            }
            EngineOp::Message(SocketOp::ConnectError { message }) => {
                break SessionEnd::Failed(message);
            }
            EngineOp::Message(SocketOp::Disconnect) => {
                break end_of(joined, "io server disconnect");
            }
            EngineOp::Message(SocketOp::Event { name, args }) => {
                if name != events::TRAFFIC_UPDATE {
                    debug!(event = %name, "ignoring event");
                    continue;
                }
                let Some(payload) = args.into_iter().next() else {
                    warn!("traffic_update without payload");
                    out.bump(|s| s.decode_failures += 1);
                    continue;
                };
                match decode_traffic_update(payload) {
                    Ok(snapshot) => {
                        out.bump(|s| s.updates += 1);
                        if !out.emit(DashboardEvent::TrafficUpdate(snapshot)).await {
                            break SessionEnd::Abandoned;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable traffic_update");
                        out.bump(|s| s.decode_failures += 1);
                    }
                }
            }
            EngineOp::Message(SocketOp::Ignored) => {}
        }

        if out.closed() {
            break SessionEnd::Abandoned;
        }
    };

    let _ = ws.close(None).await;
    end
}

fn end_of(joined: bool, reason: &str) -> SessionEnd {
    if joined {
        SessionEnd::Lost(reason.to_string())
    } else {
        SessionEnd::Failed(format!("{reason} before namespace connect"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
