//! Response types for CLI output
//!
//! Positions are 1-indexed and paths relative to the working root where
//! possible.

use std::path::Path;

use serde::Serialize;

use crate::models::diagnostic::Diagnostic;
use crate::models::lsp::{CompletionItem, DocumentSymbol, Location, TextEdit, uri_to_path};

/// Location in a file (relative path by default)
#[derive(Debug, Clone, Serialize)]
pub struct LocationOutput {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl LocationOutput {
    pub fn from_location(location: &Location, root: &Path) -> Self {
        let path = uri_to_path(&location.uri);
        let file = path
            .strip_prefix(root)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.display().to_string());
        let (line, column) = location.range.start.to_display();
        let (end_line, end_column) = location.range.end.to_display();

        Self {
            file,
            line,
            column,
            end_line,
            end_column,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationsResponse {
    pub count: usize,
    pub locations: Vec<LocationOutput>,
}

impl LocationsResponse {
    pub fn new(locations: &[Location], root: &Path) -> Self {
        Self {
            count: locations.len(),
            locations: locations
                .iter()
                .map(|l| LocationOutput::from_location(l, root))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HoverResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticOutput {
    pub severity: String,
    pub message: String,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl From<&Diagnostic> for DiagnosticOutput {
    fn from(d: &Diagnostic) -> Self {
        Self {
            severity: d.severity.to_string(),
            message: d.message.clone(),
            line: d.display_line(),
            column: d.display_column(),
            code: d.code.clone(),
            source: d.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsResponse {
    pub file: String,
    pub language: String,
    pub count: usize,
    pub diagnostics: Vec<DiagnosticOutput>,
}

/// Document symbol tree node
#[derive(Debug, Clone, Serialize)]
pub struct SymbolOutput {
    pub name: String,
    pub kind: &'static str,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SymbolOutput>,
}

impl From<&DocumentSymbol> for SymbolOutput {
    fn from(symbol: &DocumentSymbol) -> Self {
        let (line, column) = symbol.selection_range.start.to_display();
        Self {
            name: symbol.name.clone(),
            kind: symbol.kind_name(),
            line,
            column,
            detail: symbol.detail.clone(),
            children: symbol.children.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolsResponse {
    pub file: String,
    pub count: usize,
    pub symbols: Vec<SymbolOutput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutput {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub insert_text: String,
}

impl From<&CompletionItem> for CompletionOutput {
    fn from(item: &CompletionItem) -> Self {
        Self {
            label: item.label.clone(),
            kind: item.kind,
            detail: item.detail.clone(),
            insert_text: item.insert_text().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    pub is_incomplete: bool,
    pub count: usize,
    pub items: Vec<CompletionOutput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextEditOutput {
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub new_text: String,
}

impl From<&TextEdit> for TextEditOutput {
    fn from(edit: &TextEdit) -> Self {
        let (line, column) = edit.range.start.to_display();
        let (end_line, end_column) = edit.range.end.to_display();
        Self {
            line,
            column,
            end_line,
            end_column,
            new_text: edit.new_text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatResponse {
    pub file: String,
    pub count: usize,
    pub edits: Vec<TextEditOutput>,
}
