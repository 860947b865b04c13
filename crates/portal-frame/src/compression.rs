use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{FrameError, Result};

/// Leading bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Gzip-compress `data`.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::default());
    encoder.write_all(data).map_err(FrameError::Compress)?;
    encoder.finish().map_err(FrameError::Compress)
}

/// Inflate a gzip stream produced by [`compress`] or any gzip writer.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if !is_gzip(data) {
        return Err(FrameError::NotGzip);
    }
    let mut out = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(FrameError::Decompress)?;
    Ok(out)
}

pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_including_empty() {
        let inputs: [&[u8]; 4] = [b"", b"a", b"{\"verts\":[0,0,0,1,1,1]}", &[0u8; 4096]];
        for input in inputs {
            let packed = compress(input).unwrap();
            assert!(is_gzip(&packed));
            assert_eq!(decompress(&packed).unwrap(), input);
        }
    }

    #[test]
    fn repetitive_input_shrinks() {
        let input = "mesh ".repeat(1000);
        assert!(compress(input.as_bytes()).unwrap().len() < input.len() / 10);
    }

    #[test]
    fn missing_signature_is_format_error() {
        let err = decompress(b"plain text").unwrap_err();
        assert!(matches!(err, FrameError::NotGzip));
        assert_eq!(err.class(), crate::ErrorClass::Format);
        assert!(matches!(decompress(b""), Err(FrameError::NotGzip)));
    }

    #[test]
    fn corrupt_stream_is_reported() {
        let mut packed = compress(b"some payload that is long enough").unwrap();
        packed.truncate(packed.len() / 2);
        let err = decompress(&packed).unwrap_err();
        assert!(matches!(err, FrameError::Decompress(_)));
        assert_eq!(err.class(), crate::ErrorClass::Format);
    }
}
