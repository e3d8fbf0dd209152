//! Error type for the dashboard crate.
//!
//! Snapshot rejection is not an error; it is reported as an
//! [`UpdateOutcome`](crate::sync::UpdateOutcome) by
//! [`StateSync::on_message`](crate::sync::StateSync::on_message).

/// Errors raised by decoding, framing, transport and configuration.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// A payload could not be decoded from JSON.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A frame did not follow the Engine.IO / Socket.IO text framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The WebSocket layer failed.
    #[cfg(feature = "client")]
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The endpoint is not an http(s) or ws(s) URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
