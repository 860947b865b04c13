//! WebSocket listener and sender.
//!
//! Both run on the worker's private current-thread runtime. Packets travel
//! as binary frames, one packet per frame. The listener serves one client
//! at a time on a fixed route; the sender reconnects with backoff whenever
//! the peer goes away.

use std::ops::ControlFlow;

use futures_util::{SinkExt, StreamExt};
use portal_frame::decode;
use portal_transport::ws::{self, WsClientStream, WsServerStream};
use portal_transport::TransportError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionId, ConnectionSettings, Direction, TransportKind};
use crate::error::{Result, ServerError};
use crate::server::{delegate_server, LastSent, Server, ServerCore, WorkerContext};

/// Accepts WebSocket clients and queues the packets they send.
pub struct WebSocketListener {
    core: ServerCore,
}

impl WebSocketListener {
    pub fn new(id: ConnectionId, settings: ConnectionSettings) -> Self {
        Self {
            core: ServerCore::new(id, TransportKind::WebSocket, Direction::Recv, settings),
        }
    }
}

impl Server for WebSocketListener {
    fn start(&mut self) -> Result<()> {
        self.core.start_async("portal-ws-listener", run_listener)
    }

    delegate_server!();
}

async fn run_listener(ctx: WorkerContext) {
    let host = ctx.settings.listen_host().to_string();
    let listener = match ws::bind(&host, ctx.settings.port).await {
        Ok(listener) => listener,
        Err(err) => return ctx.fail(&err.into()),
    };

    loop {
        let accepted = tokio::select! {
            _ = ctx.token.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(err) => {
                if ctx.handle(TransportError::Accept(err).into()).is_break() {
                    return;
                }
                continue;
            }
        };

        let handshake = tokio::select! {
            _ = ctx.token.cancelled() => return,
            handshake = ws::accept_on_route(stream, &ctx.settings.route) => handshake,
        };
        let mut client = match handshake {
            Ok(client) => client,
            Err(err) => {
                warn!(connection = %ctx.id, %peer, error = %err, "websocket handshake failed");
                continue;
            }
        };
        info!(connection = %ctx.id, %peer, "websocket client connected");

        if serve_client(&ctx, &mut client).await.is_break() {
            return;
        }
        info!(connection = %ctx.id, %peer, "websocket client disconnected");
    }
}

/// Read frames until the client leaves (`Continue`) or the worker must
/// exit (`Break`).
async fn serve_client(ctx: &WorkerContext, client: &mut WsServerStream) -> ControlFlow<()> {
    loop {
        let incoming = tokio::select! {
            _ = ctx.token.cancelled() => {
                let _ = client.close(None).await;
                return ControlFlow::Break(());
            }
            incoming = client.next() => incoming,
        };
        let flow = match incoming {
            Some(Ok(Message::Binary(data))) => match decode(&data) {
                Ok(packet) => ctx.deliver(&packet),
                Err(err) => ctx.handle(err.into()),
            },
            Some(Ok(Message::Text(_))) => ctx.handle(ServerError::TextMessage),
            Some(Ok(Message::Close(_))) | None => return ControlFlow::Continue(()),
            // Pings are answered by tungstenite.
            Some(Ok(_)) => ControlFlow::Continue(()),
            Some(Err(err)) => {
                warn!(connection = %ctx.id, error = %err, "websocket read failed");
                return ControlFlow::Continue(());
            }
        };
        if flow.is_break() {
            return flow;
        }
    }
}

/// Connects to a WebSocket endpoint and sends queued payloads.
pub struct WebSocketSender {
    core: ServerCore,
}

impl WebSocketSender {
    pub fn new(id: ConnectionId, settings: ConnectionSettings) -> Self {
        Self {
            core: ServerCore::new(id, TransportKind::WebSocket, Direction::Send, settings),
        }
    }
}

impl Server for WebSocketSender {
    fn start(&mut self) -> Result<()> {
        self.core.start_async("portal-ws-sender", run_sender)
    }

    delegate_server!();
}

async fn run_sender(ctx: WorkerContext) {
    let url = ws::ws_url(&ctx.settings.host, ctx.settings.port, &ctx.settings.route);
    let mut last = LastSent::default();
    while let Some(mut peer) = connect_with_retry(&ctx, &url).await {
        if pump(&ctx, &mut peer, &mut last).await.is_break() {
            let _ = peer.close(None).await;
            return;
        }
        info!(connection = %ctx.id, %url, "websocket peer lost, reconnecting");
    }
}

async fn connect_with_retry(ctx: &WorkerContext, url: &str) -> Option<WsClientStream> {
    let mut backoff = ctx.backoff();
    loop {
        let attempt = tokio::select! {
            _ = ctx.token.cancelled() => return None,
            attempt = ws::connect(url) => attempt,
        };
        match attempt {
            Ok(peer) => {
                info!(connection = %ctx.id, %url, "websocket connected");
                return Some(peer);
            }
            Err(err) if err.is_transient() => {
                let delay = backoff.next_delay();
                debug!(connection = %ctx.id, %url, error = %err, ?delay, "websocket not available yet");
                tokio::select! {
                    _ = ctx.token.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => {
                ctx.fail(&err.into());
                return None;
            }
        }
    }
}

/// Drain the queue into `peer`. `Continue` asks for a reconnect.
async fn pump(ctx: &WorkerContext, peer: &mut WsClientStream, last: &mut LastSent) -> ControlFlow<()> {
    loop {
        let Some(text) = ctx.queue.try_pop() else {
            tokio::select! {
                _ = ctx.token.cancelled() => return ControlFlow::Break(()),
                incoming = peer.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => return ControlFlow::Continue(()),
                    Some(Err(err)) => {
                        warn!(connection = %ctx.id, error = %err, "websocket peer error");
                        return ControlFlow::Continue(());
                    }
                    Some(Ok(_)) => {}
                },
                _ = tokio::time::sleep(ctx.settings.poll_interval) => {}
            }
            continue;
        };

        let outbound = match ctx.frame_outbound(&text, last) {
            ControlFlow::Continue(Some(outbound)) => outbound,
            ControlFlow::Continue(None) => continue,
            ControlFlow::Break(()) => return ControlFlow::Break(()),
        };
        match peer.send(Message::Binary(outbound.wire.to_vec())).await {
            Ok(()) => {
                last.sent(outbound.checksum);
                debug!(connection = %ctx.id, len = outbound.wire.len(), "websocket frame sent");
            }
            Err(err) => {
                let err = ServerError::from(TransportError::from(err));
                return match ctx.handle(err) {
                    ControlFlow::Continue(()) => ControlFlow::Continue(()),
                    ControlFlow::Break(()) => ControlFlow::Break(()),
                };
            }
        }
    }
}
