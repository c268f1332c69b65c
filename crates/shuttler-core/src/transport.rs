//! Abstract message channel trait for shuttler transports.
//!
//! The session loop only needs whole messages in and out; framing, upgrade
//! and control frames are the transport's business.

use crate::error::ShuttlerResult;
use std::future::Future;
use std::pin::Pin;

/// Frame type a message arrived in. Responses are written back in the
/// same format as the request they answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Text,
    Binary,
}

/// A complete message received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub data: Vec<u8>,
    pub format: WireFormat,
}

impl InboundMessage {
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            format: WireFormat::Text,
        }
    }

    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            format: WireFormat::Binary,
        }
    }
}

/// A bidirectional, message-oriented connection to one peer.
pub trait MessageChannel: Send {
    /// Wait for the next message. `Ok(None)` means the peer closed cleanly.
    fn recv(&mut self)
        -> Pin<Box<dyn Future<Output = ShuttlerResult<Option<InboundMessage>>> + Send + '_>>;

    /// Write one whole message in the given format.
    fn send<'a>(
        &'a mut self,
        data: &'a [u8],
        format: WireFormat,
    ) -> Pin<Box<dyn Future<Output = ShuttlerResult<()>> + Send + 'a>>;

    /// Close the connection. Errors are informational; the channel is
    /// unusable afterwards either way.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = ShuttlerResult<()>> + Send + '_>>;
}
