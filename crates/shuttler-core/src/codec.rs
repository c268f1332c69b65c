//! JSON envelope codec.
//!
//! Decoding happens in two steps: the envelope is parsed generically, then
//! its payload is interpreted according to the envelope kind.

use crate::error::{ShuttlerError, ShuttlerResult};
use crate::messages::{AuthenticationRequest, Envelope, Request, Response, KIND_AUTHENTICATION};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Parse raw message bytes into an [`Envelope`].
///
/// Fails on malformed JSON, on a non-object payload, and on an empty kind.
pub fn decode(data: &[u8]) -> ShuttlerResult<Envelope> {
    let envelope: Envelope =
        serde_json::from_slice(data).map_err(|e| ShuttlerError::Codec(e.to_string()))?;
    if envelope.kind.is_empty() {
        return Err(ShuttlerError::Codec("envelope kind is empty".into()));
    }
    Ok(envelope)
}

/// Interpret an untyped payload as a concrete message shape.
pub fn reinterpret<T: DeserializeOwned>(payload: Map<String, Value>) -> ShuttlerResult<T> {
    serde_json::from_value(Value::Object(payload))
        .map_err(|e| ShuttlerError::InvalidPayload(e.to_string()))
}

/// Turn an envelope into a typed [`Request`] by dispatching on its kind.
///
/// Unknown kinds are not an error; only a known kind with a payload that
/// does not fit its shape is.
pub fn decode_request(envelope: Envelope) -> ShuttlerResult<Request> {
    match envelope.kind.as_str() {
        KIND_AUTHENTICATION => {
            let auth: AuthenticationRequest = reinterpret(envelope.payload)?;
            Ok(Request::Authentication(auth))
        }
        _ => Ok(Request::Unknown(envelope.kind)),
    }
}

/// Serialize a response to wire bytes.
pub fn encode(response: &Response) -> ShuttlerResult<Vec<u8>> {
    serde_json::to_vec(response).map_err(|e| ShuttlerError::Codec(e.to_string()))
}
