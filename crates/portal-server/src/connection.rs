//! Connection identity and per-connection settings.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use portal_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use portal_transport::ws::DEFAULT_ROUTE;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Opaque, stable identifier of one logical connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random (UUID v4) identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The medium a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "NAMED_PIPE", alias = "PIPE")]
    NamedPipe,
    #[serde(rename = "MMAP", alias = "SHARED_MEMORY", alias = "SHM")]
    SharedMemory,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "WEBSOCKETS", alias = "WEBSOCKET", alias = "WS")]
    WebSocket,
}

impl TransportKind {
    pub const ALL: [TransportKind; 4] = [
        TransportKind::NamedPipe,
        TransportKind::SharedMemory,
        TransportKind::Udp,
        TransportKind::WebSocket,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::NamedPipe => "NAMED_PIPE",
            TransportKind::SharedMemory => "MMAP",
            TransportKind::Udp => "UDP",
            TransportKind::WebSocket => "WEBSOCKETS",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "NAMED_PIPE" | "PIPE" => Ok(TransportKind::NamedPipe),
            "MMAP" | "SHARED_MEMORY" | "SHM" => Ok(TransportKind::SharedMemory),
            "UDP" => Ok(TransportKind::Udp),
            "WEBSOCKETS" | "WEBSOCKET" | "WS" => Ok(TransportKind::WebSocket),
            _ => Err(ServerError::InvalidKind(s.to_string())),
        }
    }
}

/// Whether a connection receives from or sends to the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "SEND")]
    Send,
    #[serde(rename = "RECV", alias = "RECEIVE")]
    Recv,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Send => "SEND",
            Direction::Recv => "RECV",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "SEND" => Ok(Direction::Send),
            "RECV" | "RECEIVE" => Ok(Direction::Recv),
            _ => Err(ServerError::InvalidDirection(s.to_string())),
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_uppercase().replace('-', "_")
}

/// Timing and size limits for a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Bound on every blocking read or accept; also the stop latency.
    pub io_timeout: Duration,
    /// How long a sender waits on its queue before re-checking cancellation.
    pub queue_timeout: Duration,
    /// First reconnect delay.
    pub retry_initial: Duration,
    /// Reconnect delay cap.
    pub retry_max: Duration,
    /// Largest payload accepted from a stream medium.
    pub max_payload_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_millis(100),
            queue_timeout: Duration::from_millis(100),
            retry_initial: Duration::from_millis(100),
            retry_max: Duration::from_secs(2),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Addressing and behaviour for every medium.
///
/// All media read from the same record, so switching a connection's
/// transport kind keeps the user's values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Pipe name or shared-memory tag.
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Listen on all interfaces instead of `host`.
    pub external: bool,
    /// Shared-memory capacity in KiB.
    pub buffer_kb: usize,
    /// WebSocket route.
    pub route: String,
    /// Shared-memory poll period.
    pub poll_interval: Duration,
    /// Gzip payloads before sending.
    pub compress: bool,
    pub worker: WorkerConfig,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            name: "testpipe".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6000,
            external: false,
            buffer_kb: 1024,
            route: DEFAULT_ROUTE.to_string(),
            poll_interval: Duration::from_millis(10),
            compress: false,
            worker: WorkerConfig::default(),
        }
    }
}

impl ConnectionSettings {
    /// Shared-memory capacity in bytes.
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_kb.saturating_mul(1024)
    }

    /// Host a listener binds to.
    pub fn listen_host(&self) -> &str {
        if self.external {
            portal_transport::udp::bind_host(true)
        } else {
            &self.host
        }
    }

    /// Stream framing limits derived from the worker config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.worker.max_payload_size,
            read_timeout: Some(self.worker.io_timeout),
            write_timeout: Some(self.worker.io_timeout),
        }
    }
}

/// One logical channel: identity, medium, direction and addressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub kind: TransportKind,
    pub direction: Direction,
    #[serde(default)]
    pub settings: ConnectionSettings,
}

impl Connection {
    /// New connection with a generated id.
    pub fn new(kind: TransportKind, direction: Direction, settings: ConnectionSettings) -> Self {
        Self {
            id: ConnectionId::generate(),
            kind,
            direction,
            settings,
        }
    }

    pub fn with_id(mut self, id: impl Into<ConnectionId>) -> Self {
        self.id = id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        for (input, expected) in [
            ("udp", TransportKind::Udp),
            ("NAMED_PIPE", TransportKind::NamedPipe),
            ("pipe", TransportKind::NamedPipe),
            ("mmap", TransportKind::SharedMemory),
            ("shared-memory", TransportKind::SharedMemory),
            (" WebSockets ", TransportKind::WebSocket),
            ("ws", TransportKind::WebSocket),
        ] {
            assert_eq!(input.parse::<TransportKind>().unwrap(), expected, "{input}");
        }
        assert!(matches!(
            "carrier-pigeon".parse::<TransportKind>(),
            Err(ServerError::InvalidKind(_))
        ));
    }

    #[test]
    fn kind_display_round_trips() {
        for kind in TransportKind::ALL {
            assert_eq!(kind.to_string().parse::<TransportKind>().unwrap(), kind);
        }
    }

    #[test]
    fn direction_parses() {
        assert_eq!("send".parse::<Direction>().unwrap(), Direction::Send);
        assert_eq!("RECV".parse::<Direction>().unwrap(), Direction::Recv);
        assert!(matches!(
            "both".parse::<Direction>(),
            Err(ServerError::InvalidDirection(_))
        ));
    }

    #[test]
    fn serde_uses_canonical_names() {
        let connection = Connection::new(
            TransportKind::WebSocket,
            Direction::Recv,
            ConnectionSettings::default(),
        )
        .with_id("conn-1");
        let json = serde_json::to_value(&connection).unwrap();
        assert_eq!(json["id"], "conn-1");
        assert_eq!(json["kind"], "WEBSOCKETS");
        assert_eq!(json["direction"], "RECV");

        let parsed: Connection =
            serde_json::from_str(r#"{"id":"c","kind":"SHM","direction":"SEND"}"#).unwrap();
        assert_eq!(parsed.kind, TransportKind::SharedMemory);
        assert_eq!(parsed.settings, ConnectionSettings::default());
    }

    #[test]
    fn defaults_and_derived_values() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.name, "testpipe");
        assert_eq!(settings.port, 6000);
        assert_eq!(settings.buffer_bytes(), 1024 * 1024);
        assert_eq!(settings.listen_host(), "127.0.0.1");
        assert_eq!(
            settings.frame_config().read_timeout,
            Some(Duration::from_millis(100))
        );

        let external = ConnectionSettings {
            external: true,
            ..ConnectionSettings::default()
        };
        assert_eq!(external.listen_host(), "0.0.0.0");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ConnectionId::generate(), ConnectionId::generate());
        assert_eq!(ConnectionId::from("abc").as_str(), "abc");
    }
}
