//! LSP client runtime
//!
//! - Content-Length framing and JSON-RPC 2.0 envelopes
//! - A client per server process with typed requests and an event stream
//! - A manager that spawns clients lazily, one per configuration, and relays
//!   their diagnostics

pub mod client;
pub mod launcher;
pub mod manager;
pub mod protocol;
pub mod servers;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientEvent, ClientOptions, LspClient, SessionState};
pub use launcher::{ProcessLauncher, ServerConnection, ServerLauncher};
pub use manager::LspClientManager;
