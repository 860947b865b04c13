use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Magic bytes: "pk" (0x70 0x6B).
pub const MAGIC: [u8; 2] = *b"pk";

/// Length of the magic marker.
pub const MAGIC_SIZE: usize = 2;

/// Header: compressed (1) + encrypted (1) + checksum (2) + size (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic plus header; the payload starts at this offset.
pub const PREFIX_SIZE: usize = MAGIC_SIZE + HEADER_SIZE;

/// Default maximum payload size for stream media: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Fixed 8-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub is_compressed: bool,
    /// Reserved. Never set by this crate; receivers must reject it.
    pub is_encrypted: bool,
    /// Opaque change tag chosen by the sender. Not an integrity check.
    pub checksum: u16,
    pub size: i32,
}

impl PacketHeader {
    /// Append the 8 header bytes to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(u8::from(self.is_compressed));
        dst.put_u8(u8::from(self.is_encrypted));
        dst.put_u16_le(self.checksum);
        dst.put_i32_le(self.size);
    }

    /// Parse a header from the first 8 bytes of `src`.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::TooShort {
                len: src.len(),
                needed: HEADER_SIZE,
            });
        }
        let mut cur = &src[..HEADER_SIZE];
        Ok(Self {
            is_compressed: cur.get_u8() != 0,
            is_encrypted: cur.get_u8() != 0,
            checksum: cur.get_u16_le(),
            size: cur.get_i32_le(),
        })
    }

    /// Payload length as announced by the header.
    pub fn payload_len(&self) -> Result<usize> {
        usize::try_from(self.size).map_err(|_| FrameError::InvalidSize(self.size))
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Build an unencrypted packet whose size is derived from the payload.
    pub fn new(payload: impl Into<Bytes>, compressed: bool, checksum: u16) -> Result<Self> {
        let payload = payload.into();
        let size = payload_size(payload.len())?;
        Ok(Self {
            header: PacketHeader {
                is_compressed: compressed,
                is_encrypted: false,
                checksum,
                size,
            },
            payload,
        })
    }

    /// The total wire size of this packet (prefix + payload).
    pub fn wire_size(&self) -> usize {
        PREFIX_SIZE + self.payload.len()
    }
}

fn payload_size(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
        size: len,
        max: i32::MAX as usize,
    })
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬────────────┬───────────┬──────────┬──────────┬──────────────┐
/// │ Magic    │ Compressed │ Encrypted │ Checksum │ Size     │ Payload      │
/// │ "pk" (2) │ (1B)       │ (1B)      │ (2B LE)  │ (4B LE)  │ (Size bytes) │
/// └──────────┴────────────┴───────────┴──────────┴──────────┴──────────────┘
/// ```
///
/// `size` defaults to the payload length. An explicit value is written as
/// given.
pub fn encode(
    payload: &[u8],
    compressed: bool,
    encrypted: bool,
    checksum: u16,
    size: Option<i32>,
) -> Result<Bytes> {
    let size = match size {
        Some(size) => size,
        None => payload_size(payload.len())?,
    };
    let header = PacketHeader {
        is_compressed: compressed,
        is_encrypted: encrypted,
        checksum,
        size,
    };
    let mut dst = BytesMut::with_capacity(PREFIX_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    header.encode_into(&mut dst);
    dst.put_slice(payload);
    Ok(dst.freeze())
}

/// Append a packet to `dst` in wire format.
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) {
    dst.reserve(packet.wire_size());
    dst.put_slice(&MAGIC);
    packet.header.encode_into(dst);
    dst.put_slice(&packet.payload);
}

/// Validate magic and header without touching the payload.
pub fn peek_header(src: &[u8]) -> Result<PacketHeader> {
    check_magic(src)?;
    if src.len() < PREFIX_SIZE {
        return Err(FrameError::TooShort {
            len: src.len(),
            needed: PREFIX_SIZE,
        });
    }
    PacketHeader::parse(&src[MAGIC_SIZE..])
}

/// Decode one packet from the start of `src`.
///
/// Bytes after the announced payload are ignored, so a whole shared-memory
/// segment can be passed in.
pub fn decode(src: &[u8]) -> Result<Packet> {
    let header = peek_header(src)?;
    let len = header.payload_len()?;
    let available = src.len() - PREFIX_SIZE;
    if available < len {
        return Err(FrameError::IncompletePayload {
            expected: len,
            available,
        });
    }
    Ok(Packet {
        header,
        payload: Bytes::copy_from_slice(&src[PREFIX_SIZE..PREFIX_SIZE + len]),
    })
}

/// Decode a packet from a stream buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// On success, consumes the packet bytes from the buffer.
pub fn decode_packet(src: &mut BytesMut, max_payload: usize) -> Result<Option<Packet>> {
    if src.len() < MAGIC_SIZE {
        return Ok(None);
    }
    check_magic(src)?;
    if src.len() < PREFIX_SIZE {
        return Ok(None);
    }

    let header = PacketHeader::parse(&src[MAGIC_SIZE..PREFIX_SIZE])?;
    let len = header.payload_len()?;
    if len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: max_payload,
        });
    }
    if src.len() < PREFIX_SIZE + len {
        return Ok(None);
    }

    src.advance(PREFIX_SIZE);
    let payload = src.split_to(len).freeze();
    Ok(Some(Packet { header, payload }))
}

fn check_magic(src: &[u8]) -> Result<()> {
    if src.len() < MAGIC_SIZE {
        return Err(FrameError::TooShort {
            len: src.len(),
            needed: MAGIC_SIZE,
        });
    }
    if src[..MAGIC_SIZE] != MAGIC {
        return Err(FrameError::InvalidMagic {
            found: [src[0], src[1]],
        });
    }
    Ok(())
}

/// Configuration for stream packet I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_layout_is_fixed() {
        let wire = encode(b"abc", true, false, 0xBEEF, None).unwrap();
        assert_eq!(
            wire.as_ref(),
            &[0x70, 0x6B, 0x01, 0x00, 0xEF, 0xBE, 0x03, 0x00, 0x00, 0x00, b'a', b'b', b'c']
        );
    }

    #[test]
    fn decode_restores_header_and_payload() {
        for (payload, compressed, checksum) in [
            (&b""[..], false, 0u16),
            (&b"hello"[..], true, 0x1234),
            (&[0u8, 255, 7, 7][..], false, u16::MAX),
        ] {
            let wire = encode(payload, compressed, false, checksum, None).unwrap();
            let packet = decode(&wire).unwrap();
            assert_eq!(
                packet.header,
                PacketHeader {
                    is_compressed: compressed,
                    is_encrypted: false,
                    checksum,
                    size: payload.len() as i32,
                }
            );
            assert_eq!(packet.payload.as_ref(), payload);
        }
    }

    #[test]
    fn explicit_size_is_written_verbatim() {
        let wire = encode(b"abcdef", false, false, 1, Some(3)).unwrap();
        let packet = decode(&wire).unwrap();
        assert_eq!(packet.header.size, 3);
        assert_eq!(packet.payload.as_ref(), b"abc");
    }

    #[test]
    fn decode_rejects_short_input() {
        for len in 0..PREFIX_SIZE {
            let wire = encode(b"", false, false, 0, None).unwrap();
            let err = decode(&wire[..len]).unwrap_err();
            assert!(
                matches!(err, FrameError::TooShort { .. }),
                "len {len}: {err:?}"
            );
        }
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut wire = encode(b"x", false, false, 0, None).unwrap().to_vec();
        wire[0] = b'P';
        assert!(matches!(
            decode(&wire),
            Err(FrameError::InvalidMagic { found }) if found == *b"Pk"
        ));
    }

    #[test]
    fn decode_rejects_negative_size() {
        let wire = encode(b"", false, false, 0, Some(-1)).unwrap();
        assert!(matches!(decode(&wire), Err(FrameError::InvalidSize(-1))));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let wire = encode(b"hello", false, false, 0, None).unwrap();
        let err = decode(&wire[..wire.len() - 2]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::IncompletePayload {
                expected: 5,
                available: 3
            }
        ));
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut segment = vec![0u8; 64];
        let wire = encode(b"state", false, false, 9, None).unwrap();
        segment[..wire.len()].copy_from_slice(&wire);
        let packet = decode(&segment).unwrap();
        assert_eq!(packet.payload.as_ref(), b"state");
    }

    #[test]
    fn nonzero_flag_bytes_read_as_true() {
        let mut wire = encode(b"", false, false, 0, None).unwrap().to_vec();
        wire[3] = 0x02;
        assert!(peek_header(&wire).unwrap().is_encrypted);
    }

    #[test]
    fn stream_decode_waits_for_complete_packet() {
        let wire = encode(b"hello", false, false, 0, None).unwrap();
        let mut buf = BytesMut::from(&wire[..1]);
        assert!(decode_packet(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());

        let mut buf = BytesMut::from(&wire[..PREFIX_SIZE + 2]);
        assert!(decode_packet(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), PREFIX_SIZE + 2);
    }

    #[test]
    fn stream_decode_consumes_consecutive_packets() {
        let mut buf = BytesMut::new();
        encode_packet(&Packet::new("first", false, 1).unwrap(), &mut buf);
        encode_packet(&Packet::new("second", true, 2).unwrap(), &mut buf);

        let p1 = decode_packet(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let p2 = decode_packet(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();

        assert_eq!((p1.header.checksum, p1.payload.as_ref()), (1, b"first".as_ref()));
        assert_eq!((p2.header.checksum, p2.payload.as_ref()), (2, b"second".as_ref()));
        assert!(p2.header.is_compressed);
        assert!(buf.is_empty());
    }

    #[test]
    fn stream_decode_enforces_payload_cap() {
        let mut buf = BytesMut::from(&encode(b"", false, false, 0, Some(1024)).unwrap()[..]);
        assert!(matches!(
            decode_packet(&mut buf, 16),
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }

    #[test]
    fn stream_decode_rejects_bad_magic_early() {
        let mut buf = BytesMut::from(&b"xx"[..]);
        assert!(matches!(
            decode_packet(&mut buf, DEFAULT_MAX_PAYLOAD),
            Err(FrameError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn packet_wire_size() {
        let packet = Packet::new(Bytes::from_static(b"test"), false, 0).unwrap();
        assert_eq!(packet.header.size, 4);
        assert_eq!(packet.wire_size(), PREFIX_SIZE + 4);
    }
}
