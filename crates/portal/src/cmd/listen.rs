use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use portal_server::{ConnectionManager, Direction};
use tracing::{info, warn};

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{fault_error, server_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

/// Host poll loop for one listener: start, drain the queue every tick,
/// watch the fault slot, then stop and remove.
pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let connection = args.connection.to_connection(Direction::Recv)?;
    let tick = parse_duration(&args.tick)?;
    let deadline = match args.duration.as_deref() {
        Some(duration) => Some(Instant::now() + parse_duration(duration)?),
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut manager = ConnectionManager::new();
    manager
        .get_connection(&connection)
        .map_err(|err| server_error("create failed", err))?
        .start()
        .map_err(|err| server_error("start failed", err))?;
    info!(connection = %connection.id, kind = %connection.kind, "listening");

    let mut printed = 0usize;
    let outcome = 'poll: loop {
        if !running.load(Ordering::SeqCst) {
            break Ok(SUCCESS);
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break Ok(SUCCESS);
        }

        let server = manager
            .get_connection(&connection)
            .map_err(|err| server_error("lookup failed", err))?;

        for message in server.queue().drain() {
            print_message(&connection.id, connection.kind, &message, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                break 'poll Ok(SUCCESS);
            }
        }

        if let Some(fault) = server.error() {
            if fault.class.is_fatal() {
                break Err(fault_error("connection failed", &fault));
            }
            warn!(connection = %connection.id, %fault, "message dropped");
            server.clear_error();
        } else if !server.is_running() {
            break Err(CliError::new(INTERNAL, "listener exited without a fault"));
        }

        std::thread::sleep(tick);
    };

    manager.remove(&connection.id);
    outcome
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
