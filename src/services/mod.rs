//! Service layer for lsp-hub

pub mod config;
pub mod lsp;

pub use config::{ConfigService, DefaultConfigService};
pub use lsp::{DefaultLspService, LspService, ServerStatus};
