//! Framed string messaging between a host application and external peers.
//!
//! portal moves UTF-8 strings over four media (named pipes, shared memory,
//! UDP and WebSocket) using one small packet format, with a background
//! listener or sender per connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: raw media (pipe endpoints, shared-memory segments, UDP
//!   sockets, WebSocket accept/connect)
//! - [`frame`]: packet codec, CRC16 change checksum, gzip payloads
//! - [`server`]: listener/sender workers and the connection manager
//!
//! # Example
//!
//! ```no_run
//! use portal::server::{ConnectionId, ConnectionManager, ConnectionSettings, Direction, TransportKind};
//!
//! let mut manager = ConnectionManager::new();
//! let id = ConnectionId::from("viewport");
//! let settings = ConnectionSettings { port: 6000, ..ConnectionSettings::default() };
//! let listener = manager.get(TransportKind::Udp, &id, Direction::Recv, &settings)?;
//! listener.start()?;
//! for message in listener.queue().drain() {
//!     println!("{message}");
//! }
//! # Ok::<(), portal::server::ServerError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use portal_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use portal_frame::*;
}

/// Re-export worker and connection-management types.
pub mod server {
    pub use portal_server::*;
}
