//! signal-dashboard binary
//!
//! Connects to the traffic producer and redraws the dashboard in the
//! terminal on every render tick.
//!
//! ## Configuration (TOML file + env via `config` crate, CLI overrides)
//!
//! | Key                                | Default                 | Description                  |
//! |------------------------------------|-------------------------|------------------------------|
//! | `DASHBOARD_ENDPOINT`               | `http://localhost:5000` | Producer URL                 |
//! | `DASHBOARD_SOCKET_PATH`            | `/socket.io`            | Socket.IO mount path         |
//! | `DASHBOARD_RECONNECT_DELAY_MS`     | `1000`                  | Fixed reconnect backoff      |
//! | `DASHBOARD_MAX_RECONNECT_ATTEMPTS` | unlimited               | Give up after N failures     |
//! | `DASHBOARD_CONNECT_TIMEOUT_MS`     | `10000`                 | Per-attempt connect budget   |
//! | `DASHBOARD_RENDER_INTERVAL_MS`     | `1000`                  | Redraw period                |
//! | `DASHBOARD_STALE_AFTER_MS`         | `5000`                  | Stale snapshot threshold     |
//! | `DASHBOARD_EVENT_BUFFER`           | `1024`                  | Bridge event queue depth     |

use anyhow::{Context, Result};
use clap::Parser;
use signal_dashboard::{render_dashboard, DashboardClient, DashboardConfig};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "signal-dashboard", about = "Live intersection signal dashboard", version)]
struct Args {
    /// TOML config file
    #[arg(long, env = "DASHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Producer URL (overrides config)
    #[arg(long)]
    endpoint: Option<String>,

    /// Reconnect backoff in milliseconds
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// Give up after this many failed attempts
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,

    /// Redraw period in milliseconds
    #[arg(long)]
    render_interval_ms: Option<u64>,

    /// Flag the snapshot stale after this many milliseconds
    #[arg(long)]
    stale_after_ms: Option<u64>,

    /// Log state changes only; do not redraw the dashboard
    #[arg(long)]
    quiet: bool,
}

impl Args {
    fn apply(&self, cfg: &mut DashboardConfig) {
        if let Some(endpoint) = &self.endpoint {
            cfg.endpoint = endpoint.clone();
        }
        if let Some(ms) = self.reconnect_delay_ms {
            cfg.reconnect_delay_ms = ms;
        }
        if let Some(n) = self.max_reconnect_attempts {
            cfg.max_reconnect_attempts = Some(n);
        }
        if let Some(ms) = self.render_interval_ms {
            cfg.render_interval_ms = ms;
        }
        if let Some(ms) = self.stale_after_ms {
            cfg.stale_after_ms = ms;
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("signal_dashboard=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut cfg = DashboardConfig::load(args.config.as_deref())
        .context("loading dashboard configuration")?;
    args.apply(&mut cfg);
    cfg.validate().context("validating dashboard configuration")?;

    log::info!(
        "Starting signal-dashboard (endpoint='{}', reconnect={}ms, render={}ms)",
        cfg.endpoint,
        cfg.reconnect_delay_ms,
        cfg.render_interval_ms,
    );

    let quiet = args.quiet;
    let mut client = DashboardClient::new(cfg);
    client.subscribe(|event| log::debug!("{event:?}"));

    client
        .run(|view| {
            if quiet {
                return;
            }
            // Clear screen, home cursor.
            print!("\x1b[2J\x1b[H{}", render_dashboard(view));
        })
        .await
        .context("running dashboard")?;

    Ok(())
}
