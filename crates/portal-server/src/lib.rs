//! Listener/sender workers and connection management for portal.
//!
//! Every medium (named pipe, shared memory, UDP, WebSocket) has a listener
//! and a sender implementing the same [`Server`] contract. Each runs one
//! background [`Worker`]; the host talks to it only through `start`/`stop`,
//! the string [`MessageQueue`] and the [`Fault`] slot.
//!
//! [`ConnectionManager`] keeps one server per connection id and rebuilds it
//! when the connection's kind or direction changes.

pub mod connection;
pub mod error;
pub mod factory;
pub mod fault;
pub mod manager;
pub mod pipe;
pub mod queue;
pub mod server;
pub mod shm;
pub mod state;
pub mod udp;
pub mod websocket;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

pub use connection::{
    Connection, ConnectionId, ConnectionSettings, Direction, TransportKind, WorkerConfig,
};
pub use error::{ErrorClass, Result, ServerError};
pub use factory::{ServerFactory, TransportFactory};
pub use fault::{ErrorSlot, Fault};
pub use manager::ConnectionManager;
pub use pipe::{PipeListener, PipeSender};
pub use queue::MessageQueue;
pub use server::Server;
pub use shm::{ShmListener, ShmSender};
pub use state::ServerState;
pub use udp::{UdpListener, UdpSender};
pub use websocket::{WebSocketListener, WebSocketSender};
pub use worker::{Backoff, Worker};
