//! lsp-hub - Multi-server Language Server Protocol client runtime
//!
//! Spawns language servers as child processes, speaks JSON-RPC 2.0 over
//! their stdio, and exposes typed requests, document synchronization and a
//! diagnostics stream to an editor shell.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod infra;
pub mod models;
pub mod services;

pub use error::{HubError, HubResult};
pub use infra::lsp::{ClientEvent, ClientOptions, LspClient, LspClientManager, SessionState};
