use portal_server::TransportKind;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("portal {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let kinds: Vec<_> = TransportKind::ALL
        .iter()
        .map(|kind| kind.as_str())
        .collect();

    println!("name: portal");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("PORTAL_BUILD_TARGET"));
    println!("rustc: {}", env!("PORTAL_RUSTC_VERSION"));
    println!("transports: {}", kinds.join(", "));
    println!("named_pipes: {}", if cfg!(unix) { "unix-socket" } else { "unsupported" });
    println!("wire: magic=\"pk\" header=8 bytes checksum=crc16/arc compression=gzip");

    Ok(SUCCESS)
}
