//! Registry of live servers, one per connection id.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, info};

use crate::connection::{Connection, ConnectionId, ConnectionSettings, Direction, TransportKind};
use crate::error::Result;
use crate::factory::{ServerFactory, TransportFactory};
use crate::fault::Fault;
use crate::server::Server;

/// Keeps at most one server per connection id.
///
/// Changing a connection's kind or direction always goes through
/// stop, remove and recreate; a live server is never reconfigured in place.
/// The manager does not start servers; the host does.
pub struct ConnectionManager<F: ServerFactory = TransportFactory> {
    factory: F,
    servers: HashMap<ConnectionId, Box<dyn Server>>,
}

impl ConnectionManager<TransportFactory> {
    pub fn new() -> Self {
        Self::with_factory(TransportFactory)
    }
}

impl Default for ConnectionManager<TransportFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ServerFactory> ConnectionManager<F> {
    pub fn with_factory(factory: F) -> Self {
        Self {
            factory,
            servers: HashMap::new(),
        }
    }

    /// Return the server for `id`, creating it if needed.
    ///
    /// An existing server with a different kind or direction is stopped and
    /// replaced. `settings` only apply when a server is created.
    pub fn get(
        &mut self,
        kind: TransportKind,
        id: &ConnectionId,
        direction: Direction,
        settings: &ConnectionSettings,
    ) -> Result<&mut dyn Server> {
        if let Some(existing) = self.servers.get(id) {
            if existing.kind() != kind || existing.direction() != direction {
                info!(
                    connection = %id,
                    from_kind = %existing.kind(),
                    from_direction = %existing.direction(),
                    to_kind = %kind,
                    to_direction = %direction,
                    "rebuilding connection"
                );
                self.remove(id);
            }
        }

        let server = match self.servers.entry(id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let connection = Connection {
                    id: id.clone(),
                    kind,
                    direction,
                    settings: settings.clone(),
                };
                let server = self.factory.create(&connection)?;
                debug!(connection = %id, %kind, %direction, "server created");
                entry.insert(server)
            }
        };
        Ok(&mut **server)
    }

    /// [`ConnectionManager::get`] for a full connection record.
    pub fn get_connection(&mut self, connection: &Connection) -> Result<&mut dyn Server> {
        self.get(
            connection.kind,
            &connection.id,
            connection.direction,
            &connection.settings,
        )
    }

    /// Stop and forget the server for `id`. Returns whether one existed.
    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        let Some(mut server) = self.servers.remove(id) else {
            return false;
        };
        if server.is_running() {
            server.stop();
        }
        debug!(connection = %id, "server removed");
        true
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.servers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ConnectionId> {
        self.servers.keys()
    }

    /// Every server that currently holds a fault.
    pub fn faults(&self) -> Vec<(ConnectionId, Fault)> {
        let mut faults: Vec<_> = self
            .servers
            .iter()
            .filter_map(|(id, server)| server.error().map(|fault| (id.clone(), fault)))
            .collect();
        faults.sort_by(|a, b| a.0.cmp(&b.0));
        faults
    }

    /// Stop every running server, keeping the entries.
    pub fn stop_all(&mut self) {
        for server in self.servers.values_mut() {
            if server.is_running() {
                server.stop();
            }
        }
    }
}

impl<F: ServerFactory> Drop for ConnectionManager<F> {
    fn drop(&mut self) {
        self.stop_all();
    }
}
