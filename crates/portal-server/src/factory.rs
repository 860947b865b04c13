//! Construction of listener/sender variants from a connection identity.

use crate::connection::{Connection, Direction, TransportKind};
use crate::error::Result;
use crate::pipe::{PipeListener, PipeSender};
use crate::server::Server;
use crate::shm::{ShmListener, ShmSender};
use crate::udp::{UdpListener, UdpSender};
use crate::websocket::{WebSocketListener, WebSocketSender};

/// Builds the server for a `(kind, direction)` pair.
///
/// [`crate::ConnectionManager`] is generic over this so hosts and tests can
/// substitute their own servers.
pub trait ServerFactory {
    fn create(&self, connection: &Connection) -> Result<Box<dyn Server>>;
}

/// Builds the eight transport variants shipped with this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportFactory;

impl ServerFactory for TransportFactory {
    fn create(&self, connection: &Connection) -> Result<Box<dyn Server>> {
        let id = connection.id.clone();
        let settings = connection.settings.clone();
        let server: Box<dyn Server> = match (connection.kind, connection.direction) {
            (TransportKind::NamedPipe, Direction::Recv) => Box::new(PipeListener::new(id, settings)),
            (TransportKind::NamedPipe, Direction::Send) => Box::new(PipeSender::new(id, settings)),
            (TransportKind::SharedMemory, Direction::Recv) => Box::new(ShmListener::new(id, settings)),
            (TransportKind::SharedMemory, Direction::Send) => Box::new(ShmSender::new(id, settings)),
            (TransportKind::Udp, Direction::Recv) => Box::new(UdpListener::new(id, settings)),
            (TransportKind::Udp, Direction::Send) => Box::new(UdpSender::new(id, settings)),
            (TransportKind::WebSocket, Direction::Recv) => {
                Box::new(WebSocketListener::new(id, settings))
            }
            (TransportKind::WebSocket, Direction::Send) => {
                Box::new(WebSocketSender::new(id, settings))
            }
        };
        Ok(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionSettings;
    use crate::state::ServerState;

    #[test]
    fn builds_every_kind_and_direction() {
        for kind in TransportKind::ALL {
            for direction in [Direction::Send, Direction::Recv] {
                let connection = Connection::new(kind, direction, ConnectionSettings::default());
                let server = TransportFactory.create(&connection).unwrap();
                assert_eq!(server.kind(), kind);
                assert_eq!(server.direction(), direction);
                assert_eq!(server.id(), &connection.id);
                assert_eq!(server.state(), ServerState::Stopped);
                assert!(!server.is_running());
            }
        }
    }
}
