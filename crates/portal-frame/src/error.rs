use std::fmt;

/// How a failure affects the worker that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad magic or truncated header/payload. The frame is dropped.
    Framing,
    /// Payload could not be decompressed or decoded as UTF-8.
    Format,
    /// Peer went away, timed out or is busy. Retried internally.
    Transient,
    /// Bind failure, permission problem or reserved flag observed.
    /// Terminates the worker.
    Unrecoverable,
}

impl ErrorClass {
    /// Whether the worker loop has to stop.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorClass::Unrecoverable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Framing => "framing",
            ErrorClass::Format => "format",
            ErrorClass::Transient => "transient",
            ErrorClass::Unrecoverable => "unrecoverable",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than the magic marker or the fixed header need.
    #[error("packet too short ({len} bytes, need at least {needed})")]
    TooShort { len: usize, needed: usize },

    /// The leading bytes are not the packet magic.
    #[error("invalid packet magic {found:02x?} (expected \"pk\")")]
    InvalidMagic { found: [u8; 2] },

    /// The header carries a negative payload size.
    #[error("invalid payload size {0}")]
    InvalidSize(i32),

    /// The header announces more payload than is available.
    #[error("incomplete payload ({available} of {expected} bytes)")]
    IncompletePayload { expected: usize, available: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload is flagged compressed but lacks the gzip signature.
    #[error("compressed payload does not start with the gzip signature")]
    NotGzip,

    /// The gzip stream is corrupt or truncated.
    #[error("failed to decompress payload: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("failed to compress payload: {0}")]
    Compress(#[source] std::io::Error),

    /// The payload is not valid UTF-8 text.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The reserved encryption flag is set. No cipher is implemented.
    #[error("encrypted packets are unsupported")]
    EncryptionUnsupported,

    /// An I/O error occurred while reading or writing packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete packet was received.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,
}

impl FrameError {
    /// Map this error onto the worker error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            FrameError::TooShort { .. }
            | FrameError::InvalidMagic { .. }
            | FrameError::InvalidSize(_)
            | FrameError::IncompletePayload { .. }
            | FrameError::PayloadTooLarge { .. } => ErrorClass::Framing,
            FrameError::NotGzip
            | FrameError::Decompress(_)
            | FrameError::Compress(_)
            | FrameError::InvalidUtf8(_) => ErrorClass::Format,
            FrameError::EncryptionUnsupported => ErrorClass::Unrecoverable,
            FrameError::ConnectionClosed => ErrorClass::Transient,
            FrameError::Io(err) => {
                if portal_transport::is_transient_io(err) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Unrecoverable
                }
            }
        }
    }

    /// Whether this is a read timeout rather than a real failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
