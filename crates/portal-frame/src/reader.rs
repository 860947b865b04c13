use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_packet, FrameConfig, Packet};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete packets from any `Read` stream.
///
/// Handles partial reads internally. A read timeout surfaces as
/// `FrameError::Io` with `WouldBlock`/`TimedOut`; bytes already buffered
/// are kept and the next call resumes the same packet.
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = decode_packet(&mut self.buf, self.config.max_payload_size)? {
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes received but not yet returned as a packet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(unix)]
impl PacketReader<portal_transport::PipeStream> {
    /// Wrap a pipe stream and apply the read timeout from `config`.
    pub fn for_pipe(inner: portal_transport::PipeStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(unix)]
pub(crate) fn transport_to_frame_error(err: portal_transport::TransportError) -> FrameError {
    use portal_transport::TransportError;
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode, encode_packet, MAGIC};

    fn wire(packets: &[(&[u8], u16)]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (payload, checksum) in packets {
            encode_packet(&Packet::new(payload.to_vec(), false, *checksum).unwrap(), &mut buf);
        }
        buf.to_vec()
    }

    #[test]
    fn read_multiple_packets() {
        let bytes = wire(&[(&b"one"[..], 1), (&b"two"[..], 2), (&b"three"[..], 3)]);
        let mut reader = PacketReader::new(Cursor::new(bytes));

        for (payload, checksum) in [(&b"one"[..], 1u16), (&b"two"[..], 2), (&b"three"[..], 3)] {
            let packet = reader.read_packet().unwrap();
            assert_eq!(packet.header.checksum, checksum);
            assert_eq!(packet.payload.as_ref(), payload);
        }
        assert!(matches!(
            reader.read_packet(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn large_payload_spans_many_reads() {
        let payload = vec![0xAB; 64 * 1024];
        let bytes = encode(&payload, false, false, 9, None).unwrap();
        let mut reader = PacketReader::new(Cursor::new(bytes.to_vec()));
        assert_eq!(reader.read_packet().unwrap().payload.len(), payload.len());
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[(&b"slow"[..], 4)]),
            pos: 0,
        };
        let mut reader = PacketReader::new(byte_reader);

        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.header.checksum, 4);
        assert_eq!(packet.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_mid_packet() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u8(0);
        partial.put_u8(0);
        partial.put_u16_le(2);
        partial.put_i32_le(16);
        partial.put_slice(b"only-part");

        let mut reader = PacketReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn invalid_magic_in_stream() {
        let bytes = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut reader = PacketReader::new(Cursor::new(bytes));
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic { .. }));
    }

    #[test]
    fn oversized_packet_in_stream() {
        let bytes = encode(b"", false, false, 0, Some(1024)).unwrap();
        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = PacketReader::with_config(Cursor::new(bytes.to_vec()), cfg);
        assert!(matches!(
            reader.read_packet(),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn timeout_keeps_partial_packet() {
        let bytes = wire(&[(&b"resume"[..], 6)]);
        let split = 7;
        let reader = StallingReader {
            chunks: vec![
                Ok(bytes[..split].to_vec()),
                Err(ErrorKind::WouldBlock),
                Ok(bytes[split..].to_vec()),
            ],
        };
        let mut framed = PacketReader::new(reader);

        let err = framed.read_packet().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(framed.buffered(), split);

        let packet = framed.read_packet().unwrap();
        assert_eq!(packet.payload.as_ref(), b"resume");
        assert_eq!(framed.buffered(), 0);
    }

    #[test]
    fn interrupted_read_retries() {
        let bytes = wire(&[(&b"ok"[..], 8)]);
        let reader = StallingReader {
            chunks: vec![Err(ErrorKind::Interrupted), Ok(bytes)],
        };
        let mut framed = PacketReader::new(reader);
        assert_eq!(framed.read_packet().unwrap().payload.as_ref(), b"ok");
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::PacketWriter::new(left);
        let mut reader = PacketReader::new(right);

        writer
            .write_packet(&Packet::new(&b"ping"[..], false, 1).unwrap())
            .unwrap();
        let packet = reader.read_packet().unwrap();

        assert_eq!(packet.payload.as_ref(), b"ping");
        let _ = reader.get_ref();
        let _inner = reader.into_inner();
    }

    #[test]
    #[cfg(unix)]
    fn for_pipe_applies_read_timeout() {
        let name = format!("frame-reader-{}", std::process::id());
        let server = portal_transport::PipeServer::bind(&name).unwrap();
        let _client = portal_transport::PipeServer::connect(&name).unwrap();
        let stream = server
            .accept_timeout(std::time::Duration::from_secs(1))
            .unwrap()
            .expect("client should be accepted");

        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };
        let mut reader = PacketReader::for_pipe(stream, cfg).unwrap();
        assert!(reader.read_packet().unwrap_err().is_timeout());
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    /// Replays a scripted sequence of chunks and errors.
    struct StallingReader {
        chunks: Vec<std::result::Result<Vec<u8>, ErrorKind>>,
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            match self.chunks.remove(0) {
                Ok(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Err(kind) => Err(std::io::Error::from(kind)),
            }
        }
    }
}
