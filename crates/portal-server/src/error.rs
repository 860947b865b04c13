pub use portal_frame::ErrorClass;
use portal_frame::FrameError;
use portal_transport::TransportError;

/// Errors that can occur in listener/sender workers and the manager.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A WebSocket peer sent a text frame; only binary frames carry packets.
    #[error("websocket text frames are not accepted (binary frames only)")]
    TextMessage,

    /// Unknown transport kind name.
    #[error("unknown transport kind {0:?}")]
    InvalidKind(String),

    /// Unknown direction name.
    #[error("unknown direction {0:?} (expected SEND or RECV)")]
    InvalidDirection(String),

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The private async runtime for a WebSocket worker could not be built.
    #[error("failed to build worker runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The worker thread panicked.
    #[error("worker {0} panicked")]
    WorkerPanicked(String),
}

impl ServerError {
    /// Map this error onto the worker error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            ServerError::Transport(TransportError::CapacityExceeded { .. }) => ErrorClass::Framing,
            ServerError::Transport(err) if err.is_transient() => ErrorClass::Transient,
            ServerError::Transport(_) => ErrorClass::Unrecoverable,
            ServerError::Frame(err) => err.class(),
            ServerError::TextMessage => ErrorClass::Framing,
            ServerError::InvalidKind(_)
            | ServerError::InvalidDirection(_)
            | ServerError::Spawn(_)
            | ServerError::Runtime(_)
            | ServerError::WorkerPanicked(_) => ErrorClass::Unrecoverable,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn transport_errors_split_by_retryability() {
        let refused = ServerError::from(TransportError::Connect {
            addr: "x".into(),
            source: Error::from(ErrorKind::ConnectionRefused),
        });
        assert_eq!(refused.class(), ErrorClass::Transient);

        let bind = ServerError::from(TransportError::Bind {
            addr: "x".into(),
            source: Error::from(ErrorKind::PermissionDenied),
        });
        assert_eq!(bind.class(), ErrorClass::Unrecoverable);

        let oversized = ServerError::from(TransportError::CapacityExceeded {
            size: 10,
            capacity: 5,
        });
        assert_eq!(oversized.class(), ErrorClass::Framing);
    }

    #[test]
    fn frame_errors_keep_their_class() {
        assert_eq!(
            ServerError::from(FrameError::EncryptionUnsupported).class(),
            ErrorClass::Unrecoverable
        );
        assert_eq!(
            ServerError::from(FrameError::NotGzip).class(),
            ErrorClass::Format
        );
        assert_eq!(ServerError::TextMessage.class(), ErrorClass::Framing);
    }
}
