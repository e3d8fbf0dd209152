//! Observer configuration.
//!
//! Layered the usual way: built-in defaults, then an optional TOML file,
//! then `DASHBOARD_*` environment variables.  The binary applies CLI flags
//! on top of the result.
//!
//! | Key                      | Default                 |
//! |--------------------------|-------------------------|
//! | `endpoint`               | `http://localhost:5000` |
//! | `socket_path`            | `/socket.io`            |
//! | `reconnect_delay_ms`     | `1000`                  |
//! | `max_reconnect_attempts` | unlimited               |
//! | `connect_timeout_ms`     | `10000`                 |
//! | `render_interval_ms`     | `1000`                  |
//! | `stale_after_ms`         | `5000`                  |
//! | `event_buffer`           | `1024`                  |

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::socketio;

pub const ENV_PREFIX: &str = "DASHBOARD";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Producer URL (`http(s)://` or `ws(s)://`).
    pub endpoint: String,
    /// Socket.IO mount path on the producer.
    pub socket_path: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Consecutive failures before giving up; `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Budget for one WebSocket connect + handshake.
    pub connect_timeout_ms: u64,
    /// Render tick; countdowns are re-derived this often.
    pub render_interval_ms: u64,
    /// Age after which the displayed snapshot is flagged stale.
    pub stale_after_ms: u64,
    /// Bridge → client event queue depth.
    pub event_buffer: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000".into(),
            socket_path: socketio::DEFAULT_PATH.into(),
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: None,
            connect_timeout_ms: 10_000,
            render_interval_ms: 1000,
            stale_after_ms: 5000,
            event_buffer: 1024,
        }
    }
}

impl DashboardConfig {
    /// Load defaults ← `file` (if given) ← environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(::config::File::from(path));
        }
        let cfg: Self = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        socketio::socket_url(&self.endpoint, &self.socket_path)?;
        if self.render_interval_ms == 0 {
            return Err(::config::ConfigError::Message("render_interval_ms must be > 0".into()).into());
        }
        if self.max_reconnect_attempts == Some(0) {
            return Err(::config::ConfigError::Message(
                "max_reconnect_attempts must be > 0 (omit it to retry forever)".into(),
            )
            .into());
        }
        if self.event_buffer == 0 {
            return Err(::config::ConfigError::Message("event_buffer must be > 0".into()).into());
        }
        Ok(())
    }

    pub fn socket_url(&self) -> Result<String> {
        socketio::socket_url(&self.endpoint, &self.socket_path)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.stale_after_ms).unwrap_or(i64::MAX))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;

    #[test]
    fn defaults_are_valid() {
        let cfg = DashboardConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(
            cfg.socket_url().unwrap(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(cfg.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(cfg.stale_after(), chrono::Duration::seconds(5));
        assert!(cfg.max_reconnect_attempts.is_none());
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let path = std::env::temp_dir().join(format!(
            "signal-dashboard-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "endpoint = \"https://signals.example.org\"\nreconnect_delay_ms = 250\nmax_reconnect_attempts = 3\n",
        )
        .unwrap();

        let cfg = DashboardConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.endpoint, "https://signals.example.org");
        assert_eq!(cfg.reconnect_delay_ms, 250);
        assert_eq!(cfg.max_reconnect_attempts, Some(3));
        assert_eq!(cfg.render_interval_ms, 1000);
        assert_eq!(cfg.socket_path, "/socket.io");
    }

    #[test]
    fn rejects_zero_render_interval() {
        let cfg = DashboardConfig {
            render_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(DashboardError::Config(_))));
    }

    #[test]
    fn rejects_zero_reconnect_attempts() {
        let cfg = DashboardConfig {
            max_reconnect_attempts: Some(0),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(DashboardError::Config(_))));

        let one = DashboardConfig {
            max_reconnect_attempts: Some(1),
            ..Default::default()
        };
        assert!(one.validate().is_ok());
    }

    #[test]
    fn tls_endpoints_map_to_wss() {
        let cfg = DashboardConfig {
            endpoint: "https://signals.example.org".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
        assert!(cfg.socket_url().unwrap().starts_with("wss://signals.example.org/"));
    }

    #[test]
    fn rejects_bad_endpoint() {
        let cfg = DashboardConfig {
            endpoint: "localhost:5000".into(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(DashboardError::InvalidEndpoint(_))
        ));
    }
}
