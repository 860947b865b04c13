//! UDP listener and sender. One packet per datagram.

use std::ops::ControlFlow;

use portal_frame::decode;
use portal_transport::udp::{resolve, UdpEndpoint};
use tracing::debug;

use crate::connection::{ConnectionId, ConnectionSettings, Direction, TransportKind};
use crate::error::Result;
use crate::server::{delegate_server, LastSent, Server, ServerCore, WorkerContext};

/// Receives packets on a bound UDP socket.
pub struct UdpListener {
    core: ServerCore,
}

impl UdpListener {
    pub fn new(id: ConnectionId, settings: ConnectionSettings) -> Self {
        Self {
            core: ServerCore::new(id, TransportKind::Udp, Direction::Recv, settings),
        }
    }
}

impl Server for UdpListener {
    fn start(&mut self) -> Result<()> {
        self.core.start_thread("portal-udp-listener", run_listener)
    }

    delegate_server!();
}

fn run_listener(ctx: WorkerContext) {
    let host = ctx.settings.listen_host().to_string();
    let mut endpoint =
        match UdpEndpoint::bind(&host, ctx.settings.port, ctx.settings.worker.io_timeout) {
            Ok(endpoint) => endpoint,
            Err(err) => return ctx.fail(&err.into()),
        };

    while !ctx.is_cancelled() {
        let flow = match endpoint.recv() {
            Ok(None) => continue,
            Ok(Some((datagram, from))) => {
                debug!(connection = %ctx.id, %from, len = datagram.len(), "datagram received");
                match decode(datagram) {
                    Ok(packet) => ctx.deliver(&packet),
                    Err(err) => ctx.handle(err.into()),
                }
            }
            Err(err) => ctx.handle(err.into()),
        };
        if flow.is_break() {
            return;
        }
    }
    debug!(connection = %ctx.id, "udp listener exiting");
}

/// Sends each queued payload as one datagram to `host:port`.
pub struct UdpSender {
    core: ServerCore,
}

impl UdpSender {
    pub fn new(id: ConnectionId, settings: ConnectionSettings) -> Self {
        Self {
            core: ServerCore::new(id, TransportKind::Udp, Direction::Send, settings),
        }
    }
}

impl Server for UdpSender {
    fn start(&mut self) -> Result<()> {
        self.core.start_thread("portal-udp-sender", run_sender)
    }

    delegate_server!();
}

fn run_sender(ctx: WorkerContext) {
    let target = match resolve(&ctx.settings.host, ctx.settings.port) {
        Ok(target) => target,
        Err(err) => return ctx.fail(&err.into()),
    };
    let endpoint = match UdpEndpoint::sender(target) {
        Ok(endpoint) => endpoint,
        Err(err) => return ctx.fail(&err.into()),
    };

    let mut last = LastSent::default();
    while !ctx.is_cancelled() {
        let Some(text) = ctx.queue.pop_timeout(ctx.settings.worker.queue_timeout) else {
            continue;
        };
        let outbound = match ctx.frame_outbound(&text, &last) {
            ControlFlow::Continue(Some(outbound)) => outbound,
            ControlFlow::Continue(None) => continue,
            ControlFlow::Break(()) => return,
        };
        match endpoint.send_to(&outbound.wire, target) {
            Ok(()) => {
                last.sent(outbound.checksum);
                debug!(connection = %ctx.id, %target, len = outbound.wire.len(), "datagram sent");
            }
            Err(err) => {
                if ctx.handle(err.into()).is_break() {
                    return;
                }
            }
        }
    }
}
