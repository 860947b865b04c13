//! Named-pipe listener and sender.
//!
//! The listener owns the pipe and serves one client at a time, going back
//! to accept when the client disconnects. The sender connects as a client
//! and retries with backoff while the pipe does not exist yet or is busy.

use crate::connection::{ConnectionId, ConnectionSettings, Direction, TransportKind};
use crate::error::Result;
use crate::server::{delegate_server, Server, ServerCore, WorkerContext};

/// Receives packets from clients of a named pipe.
pub struct PipeListener {
    core: ServerCore,
}

impl PipeListener {
    pub fn new(id: ConnectionId, settings: ConnectionSettings) -> Self {
        Self {
            core: ServerCore::new(id, TransportKind::NamedPipe, Direction::Recv, settings),
        }
    }
}

impl Server for PipeListener {
    fn start(&mut self) -> Result<()> {
        self.core.start_thread("portal-pipe-listener", run_listener)
    }

    delegate_server!();
}

/// Writes queued payloads into a named pipe.
pub struct PipeSender {
    core: ServerCore,
}

impl PipeSender {
    pub fn new(id: ConnectionId, settings: ConnectionSettings) -> Self {
        Self {
            core: ServerCore::new(id, TransportKind::NamedPipe, Direction::Send, settings),
        }
    }
}

impl Server for PipeSender {
    fn start(&mut self) -> Result<()> {
        self.core.start_thread("portal-pipe-sender", run_sender)
    }

    delegate_server!();
}

#[cfg(unix)]
fn run_listener(ctx: WorkerContext) {
    use portal_frame::{FrameError, PacketReader};
    use portal_transport::PipeServer;
    use tracing::{debug, info};

    use crate::error::ErrorClass;

    let server = match PipeServer::bind(&ctx.settings.name) {
        Ok(server) => server,
        Err(err) => return ctx.fail(&err.into()),
    };

    'accept: while !ctx.is_cancelled() {
        let stream = match server.accept_timeout(ctx.settings.worker.io_timeout) {
            Ok(Some(stream)) => stream,
            Ok(None) => continue,
            Err(err) => {
                if ctx.handle(err.into()).is_break() {
                    return;
                }
                continue;
            }
        };
        info!(connection = %ctx.id, peer = ?stream.peer_credentials(), "pipe client connected");

        let mut reader = match PacketReader::for_pipe(stream, ctx.settings.frame_config()) {
            Ok(reader) => reader,
            Err(err) => {
                if ctx.handle(err.into()).is_break() {
                    return;
                }
                continue;
            }
        };

        while !ctx.is_cancelled() {
            match reader.read_packet() {
                Ok(packet) => {
                    if ctx.deliver(&packet).is_break() {
                        return;
                    }
                }
                Err(err) if err.is_timeout() => continue,
                Err(FrameError::ConnectionClosed) => {
                    info!(connection = %ctx.id, "pipe client disconnected");
                    continue 'accept;
                }
                Err(err) => {
                    // Stream sync is lost after a framing error; drop the client.
                    if err.class() == ErrorClass::Framing {
                        debug!(connection = %ctx.id, "dropping pipe client after framing error");
                    }
                    if ctx.handle(err.into()).is_break() {
                        return;
                    }
                    continue 'accept;
                }
            }
        }
    }
}

#[cfg(unix)]
fn run_sender(ctx: WorkerContext) {
    use std::ops::ControlFlow;

    use portal_frame::PacketWriter;
    use portal_transport::PipeServer;
    use tracing::{debug, info};

    use crate::server::LastSent;

    let mut last = LastSent::default();
    'connect: while !ctx.is_cancelled() {
        let Some(stream) = ctx.retry("pipe", || PipeServer::connect(&ctx.settings.name)) else {
            return;
        };
        info!(connection = %ctx.id, pipe = %ctx.settings.name, "connected to pipe");
        let mut writer = match PacketWriter::for_pipe(stream, ctx.settings.frame_config()) {
            Ok(writer) => writer,
            Err(err) => {
                if ctx.handle(err.into()).is_break() {
                    return;
                }
                continue;
            }
        };

        while !ctx.is_cancelled() {
            let Some(text) = ctx.queue.pop_timeout(ctx.settings.worker.queue_timeout) else {
                continue;
            };
            let outbound = match ctx.frame_outbound(&text, &last) {
                ControlFlow::Continue(Some(outbound)) => outbound,
                ControlFlow::Continue(None) => continue,
                ControlFlow::Break(()) => return,
            };
            match writer.send_bytes(&outbound.wire) {
                Ok(()) => {
                    last.sent(outbound.checksum);
                    debug!(connection = %ctx.id, len = outbound.wire.len(), "packet written to pipe");
                }
                Err(err) => {
                    if ctx.handle(err.into()).is_break() {
                        return;
                    }
                    info!(connection = %ctx.id, "pipe write failed, reconnecting");
                    continue 'connect;
                }
            }
        }
    }
}

#[cfg(not(unix))]
fn run_listener(ctx: WorkerContext) {
    ctx.fail(&portal_transport::TransportError::Unsupported("named pipes").into());
}

#[cfg(not(unix))]
fn run_sender(ctx: WorkerContext) {
    ctx.fail(&portal_transport::TransportError::Unsupported("named pipes").into());
}
