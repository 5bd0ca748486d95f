//! Command implementations for lsp-hub
//!
//! Each command is implemented in its own module.

pub mod complete;
pub mod diagnostics;
pub mod find;
pub mod format;
pub mod hover;
pub mod servers;
pub mod symbols;
