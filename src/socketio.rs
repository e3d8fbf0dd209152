//! Minimal Engine.IO v4 / Socket.IO v5 text framing over WebSocket.
//!
//! Socket.IO servers accept a raw WebSocket at
//! `/socket.io/?EIO=4&transport=websocket`.  Every WebSocket *text* frame
//! then carries exactly one Engine.IO packet; Engine.IO `message` packets
//! carry one Socket.IO packet.
//!
//! We implement only the packets this observer needs:
//!
//! | Layer     | Server → client                        | Client → server |
//! |-----------|----------------------------------------|-----------------|
//! | Engine.IO | `0` open, `1` close, `2` ping, `4` msg | `3` pong        |
//! | Socket.IO | `0` connect, `1` disconnect, `2` event, `4` connect error | `0` connect |
//!
//! Binary attachments, acks and upgrades are recognised and ignored.
//!
//! Reference: <https://socket.io/docs/v4/socket-io-protocol/>

use serde_json::Value;

use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Default Socket.IO mount path.
pub const DEFAULT_PATH: &str = "/socket.io";

/// Build the WebSocket URL for `endpoint` (`http`, `https`, `ws` or `wss`).
///
/// `http://localhost:5000` + `/socket.io` →
/// `ws://localhost:5000/socket.io/?EIO=4&transport=websocket`
pub fn socket_url(endpoint: &str, path: &str) -> Result<String> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| DashboardError::InvalidEndpoint(endpoint.to_string()))?;

    let ws_scheme = match scheme {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(DashboardError::InvalidEndpoint(endpoint.to_string())),
    };
    if rest.is_empty() {
        return Err(DashboardError::InvalidEndpoint(endpoint.to_string()));
    }

    let path = path.trim_matches('/');
    Ok(format!(
        "{ws_scheme}://{rest}/{path}/?EIO=4&transport=websocket"
    ))
}

// ---------------------------------------------------------------------------
// Outbound frame builders
// ---------------------------------------------------------------------------

/// Socket.IO `CONNECT` to the default namespace, wrapped in an Engine.IO
/// message.
pub fn connect_frame() -> String {
    "40".into()
}

/// Engine.IO `pong` – reply to every server `ping`.
pub fn pong_frame() -> String {
    "3".into()
}

// ---------------------------------------------------------------------------
// Inbound frame parsing
// ---------------------------------------------------------------------------

/// Engine.IO packet received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    /// `0{...}` – handshake.  Intervals are milliseconds.
    Open {
        sid: String,
        ping_interval: u64,
        ping_timeout: u64,
    },
    /// `1` – server is closing the transport.
    Close,
    /// `2` – must answer with [`pong_frame`].
    Ping,
    /// `3`
    Pong,
    /// `4...` – Socket.IO packet inside.
    Message(SocketOp),
    /// `5` / `6` – upgrade / noop, irrelevant for a raw WebSocket.
    Noop,
}

/// Socket.IO packet received inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketOp {
    /// `0{"sid": ..}` – namespace joined.
    Connect { sid: Option<String> },
    /// `1` – server left the namespace.
    Disconnect,
    /// `2["name", args...]`
    Event { name: String, args: Vec<Value> },
    /// `4{"message": ..}` – namespace join refused.
    ConnectError { message: String },
    /// Acks and binary packets.
    Ignored,
}

/// Parse one WebSocket text frame.
pub fn parse_frame(text: &str) -> Result<EngineOp> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| DashboardError::Protocol("empty frame".into()))?;
    let body = chars.as_str();

    match kind {
        '0' => parse_open(body),
        '1' => Ok(EngineOp::Close),
        '2' => Ok(EngineOp::Ping),
        '3' => Ok(EngineOp::Pong),
        '4' => parse_socket_packet(body).map(EngineOp::Message),
        '5' | '6' => Ok(EngineOp::Noop),
        other => Err(DashboardError::Protocol(format!(
            "unknown engine.io packet type '{other}'"
        ))),
    }
}

fn parse_open(body: &str) -> Result<EngineOp> {
    let v: Value = serde_json::from_str(body)?;
    let sid = v
        .get("sid")
        .and_then(Value::as_str)
        .ok_or_else(|| DashboardError::Protocol("open packet without sid".into()))?
        .to_string();

    Ok(EngineOp::Open {
        sid,
        ping_interval: v.get("pingInterval").and_then(Value::as_u64).unwrap_or(25_000),
        ping_timeout: v.get("pingTimeout").and_then(Value::as_u64).unwrap_or(20_000),
    })
}

fn parse_socket_packet(body: &str) -> Result<SocketOp> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| DashboardError::Protocol("empty socket.io packet".into()))?;
    let data = strip_ack_id(strip_namespace(chars.as_str()));

    match kind {
        '0' => {
            let sid = if data.is_empty() {
                None
            } else {
                let v: Value = serde_json::from_str(data)?;
                v.get("sid").and_then(Value::as_str).map(str::to_string)
            };
            Ok(SocketOp::Connect { sid })
        }
        '1' => Ok(SocketOp::Disconnect),
        '2' => {
            let v: Value = serde_json::from_str(data)?;
            let Value::Array(mut items) = v else {
                return Err(DashboardError::Protocol("event payload is not an array".into()));
            };
            if items.is_empty() {
                return Err(DashboardError::Protocol("event without a name".into()));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                _ => return Err(DashboardError::Protocol("event name is not a string".into())),
            };
            Ok(SocketOp::Event { name, args: items })
        }
        '4' => {
            let message = match serde_json::from_str::<Value>(data) {
                Ok(Value::String(s)) => s,
                Ok(v) => v
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connect error")
                    .to_string(),
                Err(_) => data.to_string(),
            };
            Ok(SocketOp::ConnectError { message })
        }
        '3' | '5' | '6' => Ok(SocketOp::Ignored),
        other => Err(DashboardError::Protocol(format!(
            "unknown socket.io packet type '{other}'"
        ))),
    }
}

/// Drop a `/nsp,` prefix. Only the default namespace is used.
fn strip_namespace(data: &str) -> &str {
    if !data.starts_with('/') {
        return data;
    }
    match data.find(',') {
        Some(idx) => &data[idx + 1..],
        None => "",
    }
}

/// Drop a numeric ack id in front of the JSON body.
fn strip_ack_id(data: &str) -> &str {
    data.trim_start_matches(|c: char| c.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -----------------------------------------------------------------------
    // URLs
    // -----------------------------------------------------------------------

    #[test]
    fn http_endpoint_becomes_ws_url() {
        assert_eq!(
            socket_url("http://localhost:5000", DEFAULT_PATH).unwrap(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_url("https://signals.example.org/", "/socket.io/").unwrap(),
            "wss://signals.example.org/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(socket_url("ftp://host", DEFAULT_PATH).is_err());
        assert!(socket_url("localhost:5000", DEFAULT_PATH).is_err());
        assert!(socket_url("http://", DEFAULT_PATH).is_err());
    }

    // -----------------------------------------------------------------------
    // Engine.IO
    // -----------------------------------------------------------------------

    #[test]
    fn parses_open_handshake() {
        let op = parse_frame(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":2500,"pingTimeout":5000,"maxPayload":1000000}"#,
        )
        .unwrap();
        assert_eq!(
            op,
            EngineOp::Open {
                sid: "abc".into(),
                ping_interval: 2500,
                ping_timeout: 5000,
            }
        );
    }

    #[test]
    fn parses_ping_and_close() {
        assert_eq!(parse_frame("2").unwrap(), EngineOp::Ping);
        assert_eq!(parse_frame("1").unwrap(), EngineOp::Close);
        assert_eq!(parse_frame("6").unwrap(), EngineOp::Noop);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_frame("").is_err());
        assert!(parse_frame("x").is_err());
        assert!(parse_frame("0not-json").is_err());
    }

    // -----------------------------------------------------------------------
    // Socket.IO
    // -----------------------------------------------------------------------

    #[test]
    fn parses_namespace_connect() {
        assert_eq!(
            parse_frame(r#"40{"sid":"xyz"}"#).unwrap(),
            EngineOp::Message(SocketOp::Connect {
                sid: Some("xyz".into())
            })
        );
        assert_eq!(
            parse_frame("40").unwrap(),
            EngineOp::Message(SocketOp::Connect { sid: None })
        );
    }

    #[test]
    fn parses_traffic_event() {
        let op = parse_frame(r#"42["traffic_update",{"intersection":{}}]"#).unwrap();
        assert_eq!(
            op,
            EngineOp::Message(SocketOp::Event {
                name: "traffic_update".into(),
                args: vec![json!({"intersection": {}})],
            })
        );
    }

    #[test]
    fn parses_event_with_namespace_and_ack() {
        let op = parse_frame(r#"42/admin,17["ping",1]"#).unwrap();
        assert_eq!(
            op,
            EngineOp::Message(SocketOp::Event {
                name: "ping".into(),
                args: vec![json!(1)],
            })
        );
    }

    #[test]
    fn parses_connect_error() {
        assert_eq!(
            parse_frame(r#"44{"message":"Not authorized"}"#).unwrap(),
            EngineOp::Message(SocketOp::ConnectError {
                message: "Not authorized".into()
            })
        );
    }

    #[test]
    fn event_without_name_is_an_error() {
        assert!(parse_frame("42[]").is_err());
        assert!(parse_frame("42[1,2]").is_err());
        assert!(parse_frame(r#"42{"a":1}"#).is_err());
    }

    #[test]
    fn builders() {
        assert_eq!(connect_frame(), "40");
        assert_eq!(pong_frame(), "3");
    }
}
