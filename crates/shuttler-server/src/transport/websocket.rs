//! WebSocket listener using tokio-tungstenite.
//!
//! Only upgrade requests for the configured path are accepted. Cross-origin
//! upgrades are refused unless explicitly allowed: a request carrying an
//! `Origin` header whose host differs from its `Host` header gets a 403.

use futures_util::{SinkExt, StreamExt};
use shuttler_core::{InboundMessage, MessageChannel, ShuttlerError, ShuttlerResult, WireFormat};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// Maximum size of a single inbound message (1 MiB).
const MAX_WS_MESSAGE_SIZE: usize = 1_048_576;

/// Limits enforced by tungstenite while frames are read, before any
/// oversized message is buffered.
fn ws_config() -> WebSocketConfig {
    WebSocketConfig {
        max_message_size: Some(MAX_WS_MESSAGE_SIZE),
        max_frame_size: Some(MAX_WS_MESSAGE_SIZE),
        ..Default::default()
    }
}

/// Upgrade rules applied to every incoming HTTP request.
#[derive(Debug, Clone)]
pub struct UpgradePolicy {
    /// Request path that may be upgraded, e.g. `/ws`.
    pub path: String,
    pub allow_cross_origin: bool,
}

impl UpgradePolicy {
    fn check(&self, request: &Request) -> Result<(), (StatusCode, &'static str)> {
        if request.uri().path() != self.path {
            return Err((StatusCode::NOT_FOUND, "not found"));
        }
        if !self.allow_cross_origin && !same_origin(request) {
            return Err((StatusCode::FORBIDDEN, "origin not allowed"));
        }
        Ok(())
    }
}

/// True when the request has no `Origin` or its host matches `Host`.
fn same_origin(request: &Request) -> bool {
    let Some(origin) = request.headers().get("origin") else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let origin_host = origin
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(origin)
        .trim_end_matches('/');
    request
        .headers()
        .get("host")
        .and_then(|h| h.to_str().ok())
        .is_some_and(|host| host.eq_ignore_ascii_case(origin_host))
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// An accepted, upgraded WebSocket connection.
pub struct WebSocketConnection {
    pub channel: WebSocketChannel,
    pub remote_addr: SocketAddr,
}

/// Bind `bind_addr` and start accepting connections.
///
/// Returns the bound address (useful when binding port 0) and a receiver that
/// yields upgraded connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
    policy: UpgradePolicy,
) -> ShuttlerResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ShuttlerError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, path = %policy.path, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    let policy = policy.clone();
                    tokio::spawn(async move {
                        let callback = |request: &Request, response: Response| {
                            match policy.check(request) {
                                Ok(()) => Ok(response),
                                Err((status, reason)) => {
                                    debug!(remote = %addr, path = %request.uri().path(), %status, "upgrade refused");
                                    Err(reject(status, reason))
                                }
                            }
                        };
                        let accepted = tokio_tungstenite::accept_hdr_async_with_config(
                            stream,
                            callback,
                            Some(ws_config()),
                        )
                        .await;
                        match accepted {
                            Ok(ws) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    channel: WebSocketChannel { ws },
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok((local_addr, rx))
}

/// [`MessageChannel`] over an upgraded WebSocket stream.
pub struct WebSocketChannel {
    ws: WebSocketStream<TcpStream>,
}

impl WebSocketChannel {
    /// Next data message. Pings are answered by tungstenite itself and
    /// oversized messages surface as a read error.
    async fn next_message(&mut self) -> ShuttlerResult<Option<InboundMessage>> {
        loop {
            let message = match self.ws.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    return Err(ShuttlerError::Transport(format!("WS recv failed: {e}")));
                }
                None => return Ok(None),
            };
            return match message {
                Message::Text(text) => Ok(Some(InboundMessage::text(text.as_bytes()))),
                Message::Binary(data) => Ok(Some(InboundMessage::binary(data.to_vec()))),
                Message::Close(_) => Ok(None),
                _ => continue,
            };
        }
    }
}

impl MessageChannel for WebSocketChannel {
    fn recv(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = ShuttlerResult<Option<InboundMessage>>> + Send + '_>> {
        Box::pin(self.next_message())
    }

    fn send<'a>(
        &'a mut self,
        data: &'a [u8],
        format: WireFormat,
    ) -> Pin<Box<dyn Future<Output = ShuttlerResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let message = match format {
                WireFormat::Text => {
                    let text = String::from_utf8(data.to_vec())
                        .map_err(|e| ShuttlerError::Transport(format!("WS text not UTF-8: {e}")))?;
                    Message::Text(text.into())
                }
                WireFormat::Binary => Message::Binary(data.to_vec().into()),
            };
            self.ws
                .send(message)
                .await
                .map_err(|e| ShuttlerError::Transport(format!("WS send failed: {e}")))
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ShuttlerResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.ws
                .close(None)
                .await
                .map_err(|e| ShuttlerError::Transport(format!("WS close failed: {e}")))
        })
    }
}
