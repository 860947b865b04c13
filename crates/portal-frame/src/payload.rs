//! Text payload helpers shared by every listener and sender.

use bytes::Bytes;
use tracing::debug;

use crate::checksum::crc16;
use crate::codec::{encode, Packet};
use crate::compression::{compress, decompress};
use crate::error::{FrameError, Result};

/// Change tag for a text payload: CRC16 over its uncompressed UTF-8 bytes.
pub fn text_checksum(text: &str) -> u16 {
    crc16(text.as_bytes())
}

/// Frame `text` for the wire, gzip-compressing it first when asked.
///
/// `checksum` is written as given; see [`text_checksum`].
pub fn seal_text(text: &str, checksum: u16, compress_payload: bool) -> Result<Bytes> {
    if compress_payload {
        let packed = compress(text.as_bytes())?;
        debug!(raw = text.len(), packed = packed.len(), "payload compressed");
        encode(&packed, true, false, checksum, None)
    } else {
        encode(text.as_bytes(), false, false, checksum, None)
    }
}

/// Recover the text carried by a decoded packet.
pub fn open_text(packet: &Packet) -> Result<String> {
    if packet.header.is_encrypted {
        return Err(FrameError::EncryptionUnsupported);
    }
    let raw = if packet.header.is_compressed {
        decompress(&packet.payload)?
    } else {
        packet.payload.to_vec()
    };
    Ok(String::from_utf8(raw)?)
}
