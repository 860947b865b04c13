//! WebSocket accept/connect helpers.
//!
//! Thin layer over `tokio-tungstenite`. Every WebSocket endpoint serves a
//! single fixed route; a handshake for any other path is answered with
//! HTTP 404 and never reaches the caller.

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Server side of an accepted WebSocket connection.
pub type WsServerStream = WebSocketStream<TcpStream>;

/// Client side of a WebSocket connection.
pub type WsClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Route used when none is configured.
pub const DEFAULT_ROUTE: &str = "/";

/// Ensure a route starts with `/`.
pub fn normalize_route(route: &str) -> String {
    let route = route.trim();
    if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    }
}

/// Build the `ws://` URL for a host, port and route.
pub fn ws_url(host: &str, port: u16, route: &str) -> String {
    format!("ws://{host}:{port}{}", normalize_route(route))
}

/// Bind the TCP listener a WebSocket endpoint accepts on.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "websocket endpoint bound");
    Ok(listener)
}

/// Complete the WebSocket handshake on `stream`, accepting only `route`.
pub async fn accept_on_route(stream: TcpStream, route: &str) -> Result<WsServerStream> {
    let expected = normalize_route(route);
    let check_route = |request: &Request, response: Response| {
        if request.uri().path() == expected {
            Ok(response)
        } else {
            debug!(path = request.uri().path(), %expected, "rejecting websocket route");
            let mut rejection = ErrorResponse::new(Some("unknown route".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, check_route).await?;
    debug!(route = %normalize_route(route), "websocket client accepted");
    Ok(ws)
}

/// Open a client connection to `url`.
pub async fn connect(url: &str) -> Result<WsClientStream> {
    let (ws, _response) =
        tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| match err {
                tokio_tungstenite::tungstenite::Error::Io(source) => TransportError::Connect {
                    addr: url.to_string(),
                    source,
                },
                other => TransportError::WebSocket(other),
            })?;
    debug!(%url, "websocket connected");
    Ok(ws)
}
