//! shuttler-core: Shared protocol library for the shuttler relay.
//!
//! Provides the JSON envelope and response types, the envelope codec,
//! and the abstract message channel trait that transports implement.

pub mod codec;
pub mod error;
pub mod messages;
pub mod transport;

// Re-export commonly used items at crate root.
pub use codec::{decode, decode_request, encode, reinterpret};
pub use error::{ShuttlerError, ShuttlerResult};
pub use messages::{AuthenticationRequest, Envelope, Request, Response, KIND_AUTHENTICATION};
pub use transport::{InboundMessage, MessageChannel, WireFormat};
