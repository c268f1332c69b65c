//! Per-connection session loop.
//!
//! Reads one envelope at a time, dispatches it by kind and writes exactly
//! one response in the frame type of the request. Messages pushed through
//! the connection's registry handle are written in between requests.
//!
//! Only transport failures and undecodable input end a session; handler
//! failures are answered with an internal error response.

use crate::handshake::{AuthOutcome, Authenticator};
use crate::registry::{ConnectionHandle, ConnectionRegistry, Registration};
use shuttler_core::{
    codec, InboundMessage, MessageChannel, Request, Response, ShuttlerError, ShuttlerResult,
    WireFormat,
};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Capacity of the per-connection push queue.
const PUSH_QUEUE: usize = 64;

/// State shared by every session of a server.
pub struct SessionContext {
    pub registry: Arc<ConnectionRegistry>,
    pub authenticator: Authenticator,
}

/// Serve one connection until it closes or fails.
///
/// Whatever the exit path, the session's registry record (if any) is removed
/// and the channel is closed exactly once before returning.
pub async fn run_session<C: MessageChannel>(
    mut channel: C,
    remote_ip: Option<IpAddr>,
    ctx: &SessionContext,
) -> ShuttlerResult<()> {
    let (handle, push_rx) = ConnectionHandle::channel(PUSH_QUEUE);
    let mut session = Session {
        channel: &mut channel,
        remote_ip,
        ctx,
        handle,
        registration: Registration::new(ctx.registry.clone()),
    };

    let result = session.run(push_rx).await;
    let conn_id = session.registration.id();
    drop(session);

    if let Err(e) = channel.close().await {
        debug!(conn_id, error = %e, "close after session end failed");
    }
    debug!(conn_id, ok = result.is_ok(), "session finished");
    result
}

struct Session<'a, C> {
    channel: &'a mut C,
    remote_ip: Option<IpAddr>,
    ctx: &'a SessionContext,
    handle: ConnectionHandle,
    registration: Registration,
}

impl<C: MessageChannel> Session<'_, C> {
    async fn run(&mut self, mut push_rx: mpsc::Receiver<Vec<u8>>) -> ShuttlerResult<()> {
        loop {
            let inbound = tokio::select! {
                Some(data) = push_rx.recv() => {
                    self.channel.send(&data, WireFormat::Text).await?;
                    continue;
                }
                read = self.channel.recv() => match read? {
                    Some(message) => message,
                    None => {
                        debug!(conn_id = self.registration.id(), "peer closed connection");
                        return Ok(());
                    }
                },
            };

            let response = self.handle_message(&inbound).await?;
            let bytes = codec::encode(&response)?;
            self.channel.send(&bytes, inbound.format).await?;
        }
    }

    /// Produce the response for one inbound message.
    ///
    /// Returns `Err` only for fatal errors. An undecodable message is fatal;
    /// the peer has already been told so when this happens.
    async fn handle_message(&mut self, inbound: &InboundMessage) -> ShuttlerResult<Response> {
        match self.respond(&inbound.data).await {
            Ok(response) => Ok(response),
            Err(e @ ShuttlerError::Codec(_)) => {
                warn!(conn_id = self.registration.id(), error = %e, "failed to parse message");
                let bytes = codec::encode(&Response::undecodable())?;
                if let Err(write_err) = self.channel.send(&bytes, inbound.format).await {
                    debug!(error = %write_err, "could not report undecodable message");
                }
                Err(e)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(conn_id = self.registration.id(), error = %e, "error handling message");
                Ok(Response::internal_error(&e))
            }
        }
    }

    async fn respond(&mut self, data: &[u8]) -> ShuttlerResult<Response> {
        let envelope = codec::decode(data)?;
        debug!(conn_id = self.registration.id(), kind = %envelope.kind, "message received");
        let request = codec::decode_request(envelope)?;
        self.dispatch(request).await
    }

    async fn dispatch(&mut self, request: Request) -> ShuttlerResult<Response> {
        match request {
            Request::Authentication(auth) => {
                let outcome: AuthOutcome = self
                    .ctx
                    .authenticator
                    .authenticate(auth, self.remote_ip, &mut self.registration, &self.handle)
                    .await?;
                Ok(outcome.response())
            }
            Request::Unknown(kind) => {
                debug!(conn_id = self.registration.id(), kind = %kind, "unhandled message kind");
                Ok(Response::unhandled(kind))
            }
        }
    }
}
