//! LSP Value Types
//!
//! Plain records handed to the editor shell. Wire-format unions are decoded
//! in `infra::lsp::protocol` and normalized into these shapes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::diagnostic::Diagnostic;

// ============================================================================
// Core LSP Types
// ============================================================================

/// Position within a document (0-indexed, LSP standard)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Convert 1-indexed user input to 0-indexed LSP position
    pub fn from_display(line: u32, column: u32) -> Self {
        Self {
            line: line.saturating_sub(1),
            character: column.saturating_sub(1),
        }
    }

    /// Convert 0-indexed LSP position to 1-indexed display position
    pub fn to_display(&self) -> (u32, u32) {
        (self.line + 1, self.character + 1)
    }
}

/// Range within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn point(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }
}

/// Location in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    #[serde(default)]
    pub range: Range,
}

impl Location {
    pub fn file_path(&self) -> PathBuf {
        uri_to_path(&self.uri)
    }
}

// ============================================================================
// Edit Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

/// Workspace-wide edit, keyed by document URI
///
/// `documentChanges` text edits are merged into `changes` on decode, so the
/// shell only ever walks one map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceEdit {
    #[serde(default)]
    pub changes: HashMap<String, Vec<TextEdit>>,
}

impl WorkspaceEdit {
    pub fn is_empty(&self) -> bool {
        self.changes.values().all(Vec::is_empty)
    }

    pub fn edit_count(&self) -> usize {
        self.changes.values().map(Vec::len).sum()
    }

    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.changes.keys().map(|uri| uri_to_path(uri)).collect();
        files.sort();
        files
    }
}

// ============================================================================
// Hover
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hover {
    /// Flattened hover text (markdown or plain text)
    pub contents: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

// ============================================================================
// Completion
// ============================================================================

/// Completion item
///
/// Serializes back into valid LSP shape so it can be sent to
/// `completionItem/resolve` unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_text: Option<String>,
    /// 1 = plain text, 2 = snippet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_text_format: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_edit: Option<TextEdit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_text_edits: Vec<TextEdit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commit_characters: Vec<String>,
    /// Opaque server data, round-tripped on resolve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CompletionItem {
    /// Text to insert when the item is accepted
    pub fn insert_text(&self) -> &str {
        self.text_edit
            .as_ref()
            .map(|e| e.new_text.as_str())
            .or(self.insert_text.as_deref())
            .unwrap_or(&self.label)
    }

    pub fn is_snippet(&self) -> bool {
        self.insert_text_format == Some(2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompletionList {
    pub is_incomplete: bool,
    pub items: Vec<CompletionItem>,
}

// ============================================================================
// Document Symbols
// ============================================================================

/// Hierarchical document symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSymbol {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// LSP `SymbolKind` code
    pub kind: u32,
    pub range: Range,
    pub selection_range: Range,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentSymbol>,
}

impl DocumentSymbol {
    pub fn kind_name(&self) -> &'static str {
        symbol_kind_name(self.kind)
    }

    /// Number of symbols in this subtree, including self
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(DocumentSymbol::count).sum::<usize>()
    }
}

pub fn symbol_kind_name(kind: u32) -> &'static str {
    match kind {
        1 => "file",
        2 => "module",
        3 => "namespace",
        4 => "package",
        5 => "class",
        6 => "method",
        7 => "property",
        8 => "field",
        9 => "constructor",
        10 => "enum",
        11 => "interface",
        12 => "function",
        13 => "variable",
        14 => "constant",
        15 => "string",
        16 => "number",
        17 => "boolean",
        18 => "array",
        19 => "object",
        20 => "key",
        21 => "null",
        22 => "enum_member",
        23 => "struct",
        24 => "event",
        25 => "operator",
        26 => "type_parameter",
        _ => "unknown",
    }
}

// ============================================================================
// Signature Help
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInformation {
    /// Parameter label; offset labels are resolved against the signature
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInformation {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterInformation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_parameter: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelp {
    pub signatures: Vec<SignatureInformation>,
    pub active_signature: u32,
    pub active_parameter: u32,
}

impl SignatureHelp {
    pub fn active(&self) -> Option<&SignatureInformation> {
        self.signatures
            .get(self.active_signature as usize)
            .or_else(|| self.signatures.first())
    }
}

// ============================================================================
// Code Actions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub title: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAction {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub is_preferred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit: Option<WorkspaceEdit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
}

impl CodeAction {
    pub fn is_quick_fix(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| k.starts_with("quickfix"))
    }
}

// ============================================================================
// Rename
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRenameResult {
    pub range: Option<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

// ============================================================================
// URI Helpers
// ============================================================================

/// Convert a filesystem path to a `file://` URI
pub fn path_to_uri(path: &Path) -> String {
    let abs_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    match url::Url::from_file_path(&abs_path) {
        Ok(url) => url.to_string(),
        Err(()) => format!("file://{}", abs_path.display()),
    }
}

/// Convert a URI to a local path
///
/// `file:` URIs become platform paths; anything else passes through unchanged.
pub fn uri_to_path(uri: &str) -> PathBuf {
    match url::Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .unwrap_or_else(|()| PathBuf::from(url.path())),
        _ => PathBuf::from(uri),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_from_display() {
        let pos = Position::from_display(10, 5);
        assert_eq!(pos.line, 9);
        assert_eq!(pos.character, 4);
        assert_eq!(pos.to_display(), (10, 5));
    }

    #[test]
    fn test_position_from_display_saturates() {
        assert_eq!(Position::from_display(0, 0), Position::new(0, 0));
    }

    #[cfg(unix)]
    #[test]
    fn test_uri_roundtrip_simple() {
        let path = PathBuf::from("/test/file.rs");
        let uri = path_to_uri(&path);
        assert_eq!(uri, "file:///test/file.rs");
        assert_eq!(uri_to_path(&uri), path);
    }

    #[cfg(unix)]
    #[test]
    fn test_uri_with_spaces() {
        let path = PathBuf::from("/path with spaces/file.rs");
        let uri = path_to_uri(&path);
        assert!(uri.contains("%20"));
        assert_eq!(uri_to_path(&uri), path);
    }

    #[cfg(unix)]
    #[test]
    fn test_uri_with_unicode() {
        let path = PathBuf::from("/tmp/한글_테스트.bas");
        let uri = path_to_uri(&path);
        assert_eq!(uri_to_path(&uri), path);
    }

    #[test]
    fn test_non_file_uri_passes_through() {
        let uri = "untitled:Untitled-1";
        assert_eq!(uri_to_path(uri), PathBuf::from(uri));

        let uri = "jdt://contents/java.base/String.class";
        assert_eq!(uri_to_path(uri), PathBuf::from(uri));
    }

    #[test]
    fn test_completion_insert_text_precedence() {
        let mut item = CompletionItem {
            label: "println".to_string(),
            ..Default::default()
        };
        assert_eq!(item.insert_text(), "println");

        item.insert_text = Some("println!($0)".to_string());
        item.insert_text_format = Some(2);
        assert_eq!(item.insert_text(), "println!($0)");
        assert!(item.is_snippet());

        item.text_edit = Some(TextEdit {
            range: Range::default(),
            new_text: "println!()".to_string(),
        });
        assert_eq!(item.insert_text(), "println!()");
    }

    #[test]
    fn test_document_symbol_count() {
        let leaf = DocumentSymbol {
            name: "x".to_string(),
            detail: None,
            kind: 13,
            range: Range::default(),
            selection_range: Range::default(),
            children: Vec::new(),
        };
        let root = DocumentSymbol {
            name: "Main".to_string(),
            detail: None,
            kind: 5,
            range: Range::default(),
            selection_range: Range::default(),
            children: vec![leaf.clone(), leaf],
        };
        assert_eq!(root.count(), 3);
        assert_eq!(root.kind_name(), "class");
    }

    #[test]
    fn test_workspace_edit_counts() {
        let mut changes = HashMap::new();
        changes.insert(
            "file:///b.bas".to_string(),
            vec![TextEdit {
                range: Range::default(),
                new_text: "new".to_string(),
            }],
        );
        changes.insert("file:///a.bas".to_string(), Vec::new());
        let edit = WorkspaceEdit { changes };

        assert_eq!(edit.edit_count(), 1);
        assert!(!edit.is_empty());
        assert_eq!(edit.files().len(), 2);
    }

    #[test]
    fn test_signature_help_active_falls_back_to_first() {
        let help = SignatureHelp {
            signatures: vec![SignatureInformation {
                label: "f(a)".to_string(),
                documentation: None,
                parameters: Vec::new(),
                active_parameter: None,
            }],
            active_signature: 4,
            active_parameter: 0,
        };
        assert_eq!(help.active().map(|s| s.label.as_str()), Some("f(a)"));
    }
}
