//! Transport listeners and their message channel adapters.

#[cfg(test)]
pub(crate) mod memory;
pub mod websocket;
