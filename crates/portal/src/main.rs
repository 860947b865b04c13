mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "portal", version, about = "Framed string messaging over pipes, shared memory, UDP and WebSocket")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", env = "PORTAL_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_server::{Direction, TransportKind};

    #[test]
    fn parses_listen_with_connection_flags() {
        let cli = Cli::try_parse_from([
            "portal", "listen", "--kind", "ws", "--port", "7001", "--route", "/feed", "--count", "3",
        ])
        .expect("listen args should parse");

        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        let connection = args.connection.to_connection(Direction::Recv).unwrap();
        assert_eq!(connection.kind, TransportKind::WebSocket);
        assert_eq!(connection.settings.port, 7001);
        assert_eq!(connection.settings.route, "/feed");
        assert_eq!(args.count, Some(3));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "portal", "send", "--json", "{\"x\":1}", "--data", "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_inspect_segment() {
        let cli = Cli::try_parse_from(["portal", "inspect", "--segment", "scene"])
            .expect("inspect args should parse");
        assert!(matches!(cli.command, Command::Inspect(_)));
    }
}
