//! Wire message types for the shuttler client protocol.
//!
//! Clients send a generic [`Envelope`]; the server answers every envelope
//! with exactly one [`Response`]. Field names follow the deployed frontend,
//! including the `"string"` token carrier and the `"sucessful"` spelling.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Envelope kind handled by the authentication handshake.
pub const KIND_AUTHENTICATION: &str = "authentication";

/// `unhandled_kind` reported when the inbound bytes could not be decoded.
pub const KIND_UNKNOWN: &str = "unknown";

/// Generic inbound message: a kind discriminator plus an untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Payload of an `authentication` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationRequest {
    /// Bearer token issued by the identity service.
    #[serde(rename = "string", alias = "token")]
    pub token: String,
}

/// A decoded request, typed by its envelope kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Authentication(AuthenticationRequest),
    /// Any kind without a handler; carries the kind as received.
    Unknown(String),
}

impl Request {
    pub fn kind(&self) -> &str {
        match self {
            Request::Authentication(_) => KIND_AUTHENTICATION,
            Request::Unknown(kind) => kind,
        }
    }
}

/// Discriminator value carried by authentication responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationTag {
    #[serde(rename = "authentication")]
    Authentication,
}

/// Discriminator value carried by internal error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InternalErrorTag {
    #[serde(rename = "InternalError")]
    InternalError,
}

/// Server response to a single envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Authentication {
        kind: AuthenticationTag,
        #[serde(rename = "sucessful")]
        successful: bool,
        rate_limited: bool,
    },
    InternalError {
        kind: InternalErrorTag,
        error: String,
    },
    Unhandled {
        unhandled_kind: String,
    },
}

impl Response {
    pub fn authentication(successful: bool, rate_limited: bool) -> Self {
        Response::Authentication {
            kind: AuthenticationTag::Authentication,
            successful,
            rate_limited,
        }
    }

    pub fn internal_error(error: impl std::fmt::Display) -> Self {
        Response::InternalError {
            kind: InternalErrorTag::InternalError,
            error: error.to_string(),
        }
    }

    pub fn unhandled(kind: impl Into<String>) -> Self {
        Response::Unhandled {
            unhandled_kind: kind.into(),
        }
    }

    /// Response sent before closing a session whose input could not be decoded.
    pub fn undecodable() -> Self {
        Self::unhandled(KIND_UNKNOWN)
    }
}
