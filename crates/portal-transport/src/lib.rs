//! Media that portal frames travel over.
//!
//! Four media are provided:
//! - Named pipes (filesystem-path Unix domain sockets, Unix only)
//! - Shared-memory segments (file-backed mappings, polled by readers)
//! - UDP datagrams
//! - WebSocket connections on a fixed route
//!
//! This is the lowest layer of portal. Nothing here knows about the frame
//! format; the framing and worker crates build on top of these types.

pub mod error;
#[cfg(unix)]
pub mod pipe;
pub mod shm;
#[cfg(unix)]
mod stream;
pub mod udp;
pub mod ws;

pub use error::{is_transient_io, Result, TransportError};
pub use shm::SharedSegment;
pub use udp::UdpEndpoint;

#[cfg(unix)]
pub use pipe::PipeServer;
#[cfg(unix)]
pub use stream::{PeerCredentials, PipeStream};
