use std::fs;
use std::time::{Duration, Instant};

use portal_server::{ConnectionManager, Direction, Server};
use tracing::info;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    fault_error, io_error, server_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE,
};

const DRAIN_TICK: Duration = Duration::from_millis(10);

pub fn run(args: SendArgs) -> CliResult<i32> {
    let connection = args.connection.to_connection(Direction::Send)?;
    let payload = resolve_payload(&args)?;
    if args.repeat == 0 {
        return Err(CliError::new(USAGE, "--repeat must be at least 1"));
    }
    let interval = parse_duration(&args.interval)?;
    let timeout = parse_duration(&args.timeout)?;
    let linger = parse_duration(&args.linger)?;

    let mut manager = ConnectionManager::new();
    let server = manager
        .get_connection(&connection)
        .map_err(|err| server_error("create failed", err))?;
    server
        .start()
        .map_err(|err| server_error("start failed", err))?;

    for round in 0..args.repeat {
        if round > 0 {
            std::thread::sleep(interval);
        }
        server.queue().push(payload.as_str());
    }
    info!(connection = %connection.id, kind = %connection.kind, repeat = args.repeat, "payload queued");

    let outcome = wait_for_drain(server, timeout, linger);
    manager.remove(&connection.id);
    outcome
}

/// Wait until the sender has taken everything off its queue, then give the
/// last write `linger` to land.
fn wait_for_drain(server: &dyn Server, timeout: Duration, linger: Duration) -> CliResult<i32> {
    let deadline = Instant::now() + timeout;
    loop {
        check_health(server)?;
        if server.queue().is_empty() {
            std::thread::sleep(linger);
            check_health(server)?;
            return Ok(SUCCESS);
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!(
                    "{} message(s) still queued after {timeout:?}; is the peer up?",
                    server.queue().len()
                ),
            ));
        }
        std::thread::sleep(DRAIN_TICK);
    }
}

fn check_health(server: &dyn Server) -> CliResult<()> {
    if let Some(fault) = server.error() {
        return Err(fault_error("send failed", &fault));
    }
    if !server.is_running() {
        return Err(CliError::new(INTERNAL, "sender exited without a fault"));
    }
    Ok(())
}

fn resolve_payload(args: &SendArgs) -> CliResult<String> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.clone());
    }
    if let Some(data) = &args.data {
        return Ok(data.clone());
    }
    if let Some(path) = &args.file {
        return fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(USAGE, "one of --json, --data or --file is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_server::{
        ConnectionId, Direction, ErrorSlot, Fault, MessageQueue, ServerError, ServerState,
        TransportKind,
    };

    /// Sender stand-in that drains its queue on demand.
    struct StubSender {
        id: ConnectionId,
        queue: MessageQueue,
        errors: ErrorSlot,
        running: bool,
    }

    impl StubSender {
        fn new() -> Self {
            Self {
                id: ConnectionId::from("stub"),
                queue: MessageQueue::new(),
                errors: ErrorSlot::new(),
                running: true,
            }
        }
    }

    impl Server for StubSender {
        fn start(&mut self) -> portal_server::Result<()> {
            self.running = true;
            Ok(())
        }
        fn stop(&mut self) {
            self.running = false;
        }
        fn is_running(&self) -> bool {
            self.running
        }
        fn is_shutdown(&self) -> bool {
            !self.running
        }
        fn state(&self) -> ServerState {
            ServerState::Running
        }
        fn kind(&self) -> TransportKind {
            TransportKind::Udp
        }
        fn direction(&self) -> Direction {
            Direction::Send
        }
        fn id(&self) -> &ConnectionId {
            &self.id
        }
        fn queue(&self) -> &MessageQueue {
            &self.queue
        }
        fn error(&self) -> Option<Fault> {
            self.errors.get()
        }
        fn clear_error(&self) {
            self.errors.clear()
        }
    }

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn drained_queue_succeeds() {
        let stub = StubSender::new();
        assert_eq!(wait_for_drain(&stub, SHORT, Duration::from_millis(1)).unwrap(), SUCCESS);
    }

    #[test]
    fn stuck_queue_times_out() {
        let stub = StubSender::new();
        stub.queue.push("pending");
        let err = wait_for_drain(&stub, SHORT, Duration::from_millis(1)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.contains("1 message(s)"));
    }

    #[test]
    fn recorded_fault_fails_the_send() {
        let stub = StubSender::new();
        stub.errors.record(&ServerError::TextMessage);
        let err = wait_for_drain(&stub, SHORT, Duration::from_millis(1)).unwrap_err();
        assert_eq!(err.code, crate::exit::DATA_INVALID);
    }
}
