//! shuttler-server: relay for live update notifications.
//!
//! Accepts WebSocket connections on a single path, authenticates each one
//! against the identity service and keeps a registry of authenticated
//! connections for server-initiated pushes.

pub mod config;
pub mod handshake;
pub mod identity;
pub mod rate_limit;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use registry::{ConnectionHandle, ConnectionRecord, ConnectionRegistry};
pub use server::RelayServer;
