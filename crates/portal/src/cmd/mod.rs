use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use portal_server::{
    Connection, ConnectionId, ConnectionSettings, Direction, TransportKind, WorkerConfig,
};

use crate::exit::{server_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod inspect;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive messages on a connection and print them.
    Listen(ListenArgs),
    /// Send messages over a connection.
    Send(SendArgs),
    /// Decode a packet from a file or a shared-memory segment.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Addressing shared by `listen` and `send`.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Connection id. Generated when omitted.
    #[arg(long)]
    pub id: Option<String>,
    /// Transport kind: NAMED_PIPE, MMAP, UDP or WEBSOCKETS.
    #[arg(long, short = 'k', env = "PORTAL_KIND", default_value = "UDP")]
    pub kind: String,
    /// Pipe name or shared-memory tag.
    #[arg(long, env = "PORTAL_NAME", default_value = "testpipe")]
    pub name: String,
    /// Host to connect to, or to listen on unless --external.
    #[arg(long, env = "PORTAL_HOST", default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, short = 'p', env = "PORTAL_PORT", default_value = "6000")]
    pub port: u16,
    /// Listen on all interfaces.
    #[arg(long)]
    pub external: bool,
    /// Shared-memory capacity in KiB.
    #[arg(long, default_value = "1024")]
    pub buffer_kb: usize,
    /// WebSocket route.
    #[arg(long, default_value = portal_transport::ws::DEFAULT_ROUTE)]
    pub route: String,
    /// Shared-memory poll period (e.g. 10ms).
    #[arg(long, default_value = "10ms")]
    pub poll_interval: String,
    /// Gzip payloads before sending.
    #[arg(long)]
    pub compress: bool,
}

impl ConnectionArgs {
    pub fn to_connection(&self, direction: Direction) -> CliResult<Connection> {
        let kind: TransportKind = self
            .kind
            .parse()
            .map_err(|err| server_error("invalid --kind", err))?;
        let settings = ConnectionSettings {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            external: self.external,
            buffer_kb: self.buffer_kb,
            route: self.route.clone(),
            poll_interval: parse_duration(&self.poll_interval)?,
            compress: self.compress,
            worker: WorkerConfig::default(),
        };
        let connection = Connection::new(kind, direction, settings);
        Ok(match &self.id {
            Some(id) => connection.with_id(ConnectionId::new(id.clone())),
            None => connection,
        })
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// Host loop tick (e.g. 50ms).
    #[arg(long, default_value = "20ms")]
    pub tick: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// String payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read the payload from a UTF-8 file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Queue the payload this many times. Repeats of an unchanged payload
    /// are suppressed by the sender.
    #[arg(long, default_value = "1")]
    pub repeat: usize,
    /// Pause between repeats (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
    /// Give up if the queue is not drained within this time.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Keep the connection open after draining so the last write lands.
    #[arg(long, default_value = "200ms")]
    pub linger: String,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// File holding one raw packet.
    #[arg(conflicts_with = "segment", required_unless_present = "segment")]
    pub path: Option<PathBuf>,
    /// Shared-memory tag to read instead of a file.
    #[arg(long)]
    pub segment: Option<String>,
    /// Shared-memory capacity in KiB.
    #[arg(long, default_value = "1024")]
    pub buffer_kb: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
