use std::fmt;
use std::io;

use portal_frame::FrameError;
use portal_server::{ErrorClass, Fault, ServerError};
use portal_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::Bind { ref source, .. } | TransportError::Map { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::InvalidName(_) | TransportError::InvalidAddress(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => match other.class() {
            ErrorClass::Framing | ErrorClass::Format => {
                CliError::new(DATA_INVALID, format!("{context}: {other}"))
            }
            _ => CliError::new(INTERNAL, format!("{context}: {other}")),
        },
    }
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    match err {
        ServerError::Transport(err) => transport_error(context, err),
        ServerError::Frame(err) => frame_error(context, err),
        ServerError::InvalidKind(_) | ServerError::InvalidDirection(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

/// Exit code for a fault a worker left behind.
pub fn fault_error(context: &str, fault: &Fault) -> CliError {
    let code = match fault.class {
        ErrorClass::Framing | ErrorClass::Format => DATA_INVALID,
        ErrorClass::Transient | ErrorClass::Unrecoverable => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {}", fault.message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_conflict_is_a_transport_error() {
        let err = TransportError::Bind {
            addr: "127.0.0.1:6000".into(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert_eq!(transport_error("bind", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn bad_packets_are_data_invalid() {
        let err = FrameError::InvalidMagic { found: *b"xx" };
        assert_eq!(frame_error("decode", err).code, DATA_INVALID);
        assert_eq!(
            frame_error("decode", FrameError::EncryptionUnsupported).code,
            INTERNAL
        );
    }

    #[test]
    fn unknown_kind_is_usage() {
        let err = ServerError::InvalidKind("carrier-pigeon".into());
        assert_eq!(server_error("kind", err).code, USAGE);
    }
}
