//! Packet framing for portal.
//!
//! Every message on every medium is framed with:
//! - A 2-byte magic marker ("pk") for frame validation
//! - An 8-byte header: compressed flag, encrypted flag (reserved),
//!   a 16-bit change checksum and a signed 32-bit payload size
//!
//! The checksum is a CRC16 over the uncompressed payload and is only used
//! to suppress unchanged payloads. Compression is a separate gzip step
//! gated by the header flag.

pub mod checksum;
pub mod codec;
pub mod compression;
pub mod error;
pub mod payload;
pub mod reader;
pub mod writer;

pub use checksum::{crc16, Crc16};
pub use codec::{
    decode, decode_packet, encode, encode_packet, peek_header, FrameConfig, Packet, PacketHeader,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC, MAGIC_SIZE, PREFIX_SIZE,
};
pub use compression::{compress, decompress};
pub use error::{ErrorClass, FrameError, Result};
pub use payload::{open_text, seal_text, text_checksum};
pub use reader::PacketReader;
pub use writer::PacketWriter;
