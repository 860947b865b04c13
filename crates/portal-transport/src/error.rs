use std::path::PathBuf;

/// Errors that can occur on a transport medium.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address or path.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address or path.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pipe path is too long for the platform.
    #[error("pipe path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// A pipe name or segment tag cannot be turned into a path.
    #[error("invalid name {0:?}: must be non-empty and must not contain path separators")]
    InvalidName(String),

    /// The shared-memory segment could not be created or mapped.
    #[error("failed to map shared-memory segment {path}: {source}")]
    Map {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A frame does not fit into the medium.
    #[error("frame of {size} bytes exceeds medium capacity of {capacity} bytes")]
    CapacityExceeded { size: usize, capacity: usize },

    /// A host/port pair does not resolve to a socket address.
    #[error("invalid address {0}")]
    InvalidAddress(String),

    /// WebSocket protocol failure (handshake, framing, closed stream).
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The medium is not available on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl TransportError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Covers peers that are not listening yet, busy pipes, dropped
    /// connections and read timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connect { source, .. } => is_transient_io(source),
            TransportError::Accept(source) | TransportError::Io(source) => {
                is_transient_io(source)
            }
            TransportError::WebSocket(err) => {
                use tokio_tungstenite::tungstenite::Error as WsError;
                match err {
                    WsError::ConnectionClosed | WsError::AlreadyClosed => true,
                    WsError::Io(io) => is_transient_io(io),
                    WsError::Protocol(_) => true,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

/// Classify an I/O error as retryable.
pub fn is_transient_io(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::NotFound
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::UnexpectedEof
            | ErrorKind::ResourceBusy
    )
}

pub type Result<T> = std::result::Result<T, TransportError>;
