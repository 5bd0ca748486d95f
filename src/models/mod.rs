//! Data models for lsp-hub
//!
//! Value records exchanged with the editor shell and configuration records.

pub mod config;
pub mod diagnostic;
pub mod lsp;
pub mod server;

pub use config::{HubConfig, LspSettings};
pub use diagnostic::{Diagnostic, DiagnosticSeverity, FileDiagnostics, PublishedDiagnostics};
pub use lsp::{
    CodeAction, Command, CompletionItem, CompletionList, DocumentSymbol, Hover, Location,
    ParameterInformation, Position, PrepareRenameResult, Range, SignatureHelp,
    SignatureInformation, TextEdit, WorkspaceEdit,
};
pub use server::{LanguageServerConfig, ServerStartInfo, TransportKind};
