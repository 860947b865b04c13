use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of a listener or sender.
///
/// `Stopped → Starting → Running → Stopping → Stopped` on a clean cycle.
/// `Running → Error` when the worker hits an unrecoverable failure; the
/// host then observes the fault and calls `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Error => "error",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::Stopping,
            4 => ServerState::Error,
            _ => ServerState::Stopped,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            ServerState::Stopped => 0,
            ServerState::Starting => 1,
            ServerState::Running => 2,
            ServerState::Stopping => 3,
            ServerState::Error => 4,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between a server handle and its worker thread.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ServerState::Stopped.to_u8())))
    }

    pub(crate) fn get(&self) -> ServerState {
        ServerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ServerState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }

    /// Move to `Error` unless the host is already stopping the worker.
    pub(crate) fn fail(&self) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            match ServerState::from_u8(current) {
                ServerState::Stopping | ServerState::Stopped => None,
                _ => Some(ServerState::Error.to_u8()),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_state() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ServerState::Stopped);
        for state in [
            ServerState::Starting,
            ServerState::Running,
            ServerState::Stopping,
            ServerState::Error,
            ServerState::Stopped,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn fail_does_not_override_stop() {
        let cell = StateCell::new();
        cell.set(ServerState::Running);
        cell.fail();
        assert_eq!(cell.get(), ServerState::Error);

        cell.set(ServerState::Stopping);
        cell.fail();
        assert_eq!(cell.get(), ServerState::Stopping);
    }
}
