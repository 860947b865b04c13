use std::fs;

use portal_frame::{decode, open_text, text_checksum, Packet};
use portal_transport::shm::{segment_path, SharedSegment};

use crate::cmd::InspectArgs;
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE,
};
use crate::output::{print_packet, OutputFormat, PacketReport};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let (source, bytes) = match (&args.path, &args.segment) {
        (Some(path), _) => {
            let bytes = fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            (path.display().to_string(), bytes)
        }
        (None, Some(tag)) => read_segment(tag, args.buffer_kb)?,
        (None, None) => return Err(CliError::new(USAGE, "a packet file or --segment is required")),
    };

    let prefix = bytes.get(..portal_frame::PREFIX_SIZE);
    if prefix.is_some_and(|prefix| prefix.iter().all(|b| *b == 0)) {
        return Err(CliError::new(FAILURE, format!("{source}: no packet written yet")));
    }
    let packet = decode(&bytes).map_err(|err| frame_error(&source, err))?;
    print_packet(&report(source, &packet), format);
    Ok(SUCCESS)
}

fn read_segment(tag: &str, buffer_kb: usize) -> CliResult<(String, Vec<u8>)> {
    let path = segment_path(tag).map_err(|err| transport_error("invalid segment tag", err))?;
    if !path.exists() {
        return Err(CliError::new(
            FAILURE,
            format!("no shared-memory segment at {}", path.display()),
        ));
    }
    let segment = SharedSegment::open_path(&path, buffer_kb.saturating_mul(1024))
        .map_err(|err| transport_error("failed mapping segment", err))?;
    Ok((path.display().to_string(), segment.as_slice().to_vec()))
}

fn report(source: String, packet: &Packet) -> PacketReport {
    let (text, error) = match open_text(packet) {
        Ok(text) => (Some(text), None),
        Err(err) => (None, Some(err.to_string())),
    };
    PacketReport {
        source,
        compressed: packet.header.is_compressed,
        encrypted: packet.header.is_encrypted,
        checksum: packet.header.checksum,
        size: packet.header.size,
        wire_size: packet.wire_size(),
        checksum_matches: text
            .as_deref()
            .map(|text| text_checksum(text) == packet.header.checksum),
        text,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_frame::{encode, seal_text};

    #[test]
    fn report_flags_matching_checksum() {
        let text = "{\"frame\":7}";
        let wire = seal_text(text, text_checksum(text), true).unwrap();
        let packet = decode(&wire).unwrap();
        let report = report("test".into(), &packet);
        assert!(report.compressed);
        assert_eq!(report.text.as_deref(), Some(text));
        assert_eq!(report.checksum_matches, Some(true));
        assert_eq!(report.wire_size, wire.len());
    }

    #[test]
    fn report_keeps_header_of_unreadable_payload() {
        let packet = decode(&encode(b"sealed", false, true, 42, None).unwrap()).unwrap();
        let report = report("test".into(), &packet);
        assert!(report.encrypted);
        assert_eq!(report.checksum, 42);
        assert!(report.text.is_none());
        assert!(report.error.unwrap().contains("unsupported"));
    }
}
