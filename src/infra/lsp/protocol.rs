//! JSON-RPC 2.0 Protocol Implementation for LSP
//!
//! Envelope types, message classification, capability declarations, and the
//! wire shapes of every result the client consumes. Wire unions are decoded
//! tolerantly (missing fields default, unknown fields are ignored) and then
//! normalized into the value records in `models`.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::models::diagnostic::{Diagnostic, DiagnosticSeverity, PublishedDiagnostics};
use crate::models::lsp::{
    CodeAction, Command, CompletionItem, CompletionList, DocumentSymbol, Hover, Location,
    ParameterInformation, PrepareRenameResult, Range, SignatureHelp, SignatureInformation,
    TextEdit, WorkspaceEdit,
};

// ============================================================================
// JSON-RPC 2.0 Core Types
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(id),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: ResponseError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Value, ResponseError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC 2.0 Notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Request ID - can be number or string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl RequestId {
    /// Numeric view of the id; string ids that hold a number are accepted
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.parse().ok(),
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id)
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ResponseError {}

/// Standard JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // LSP-specific error codes
    pub const SERVER_NOT_INITIALIZED: i32 = -32002;
    pub const REQUEST_CANCELLED: i32 = -32800;
    pub const CONTENT_MODIFIED: i32 = -32801;
}

/// Incoming message from LSP server
#[derive(Debug, Clone)]
pub enum Message {
    Response(Response),
    Request(Request),
    Notification(Notification),
}

impl Message {
    /// Classify and decode one message body
    ///
    /// `id` without `method` is a response, `method` without `id` a
    /// notification, and both an inbound request from the server.
    pub fn parse(body: &[u8]) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let has_id = value.get("id").is_some();
        let has_method = value.get("method").is_some();

        match (has_id, has_method) {
            (true, true) => Ok(Message::Request(serde_json::from_value(value)?)),
            (true, false) => Ok(Message::Response(serde_json::from_value(value)?)),
            (false, true) => Ok(Message::Notification(serde_json::from_value(value)?)),
            (false, false) => {
                use serde::de::Error;
                Err(serde_json::Error::custom("Invalid LSP message"))
            }
        }
    }
}

// ============================================================================
// LSP Initialize Types
// ============================================================================

/// Text document identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

impl TextDocumentIdentifier {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Client info for identification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceFolder {
    pub uri: String,
    pub name: String,
}

/// Initialize params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub process_id: Option<u32>,
    pub root_uri: Option<String>,
    pub root_path: Option<String>,
    pub capabilities: ClientCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_folders: Option<Vec<WorkspaceFolder>>,
}

/// Client capabilities
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowClientCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_document: Option<TextDocumentClientCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceClientCapabilities>,
}

/// Window client capabilities
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WindowClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_done_progress: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_message: Option<Value>,
}

/// Text document capabilities declared by this client
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synchronization: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hover: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_help: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_symbol: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_action: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatting: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_formatting: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_diagnostics: Option<Value>,
}

/// Workspace capabilities declared by this client
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_edit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_edit: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_folders: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<bool>,
}

// ============================================================================
// Server Capabilities
// ============================================================================

/// How the server wants document changes delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TextDocumentSyncKind {
    #[default]
    None = 0,
    Full = 1,
    Incremental = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    #[serde(default)]
    pub trigger_characters: Vec<String>,
    #[serde(default)]
    pub resolve_provider: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpOptions {
    #[serde(default)]
    pub trigger_characters: Vec<String>,
    #[serde(default)]
    pub retrigger_characters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameOptions {
    #[serde(default)]
    pub prepare_provider: bool,
}

/// Server capabilities (from initialize response)
///
/// Providers may be advertised as `true` or as an options object; both mean
/// "supported". Anything absent is unsupported.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(default, deserialize_with = "sync_kind")]
    pub text_document_sync: TextDocumentSyncKind,
    #[serde(default, deserialize_with = "provider_flag")]
    pub hover_provider: bool,
    #[serde(default, deserialize_with = "provider_flag")]
    pub definition_provider: bool,
    #[serde(default, deserialize_with = "provider_flag")]
    pub references_provider: bool,
    #[serde(default, deserialize_with = "provider_flag")]
    pub document_symbol_provider: bool,
    #[serde(default, deserialize_with = "provider_flag")]
    pub code_action_provider: bool,
    #[serde(default, deserialize_with = "provider_flag")]
    pub document_formatting_provider: bool,
    #[serde(default, deserialize_with = "provider_flag")]
    pub document_range_formatting_provider: bool,
    #[serde(default, deserialize_with = "provider_options")]
    pub rename_provider: Option<RenameOptions>,
    #[serde(default, deserialize_with = "provider_options")]
    pub completion_provider: Option<CompletionOptions>,
    #[serde(default, deserialize_with = "provider_options")]
    pub signature_help_provider: Option<SignatureHelpOptions>,
}

impl ServerCapabilities {
    pub fn supports_completion(&self) -> bool {
        self.completion_provider.is_some()
    }

    pub fn supports_completion_resolve(&self) -> bool {
        self.completion_provider
            .as_ref()
            .is_some_and(|c| c.resolve_provider)
    }

    pub fn supports_signature_help(&self) -> bool {
        self.signature_help_provider.is_some()
    }

    pub fn supports_rename(&self) -> bool {
        self.rename_provider.is_some()
    }

    pub fn supports_prepare_rename(&self) -> bool {
        self.rename_provider
            .as_ref()
            .is_some_and(|r| r.prepare_provider)
    }

    pub fn completion_triggers(&self) -> &[String] {
        self.completion_provider
            .as_ref()
            .map(|c| c.trigger_characters.as_slice())
            .unwrap_or_default()
    }

    pub fn signature_help_triggers(&self) -> &[String] {
        self.signature_help_provider
            .as_ref()
            .map(|s| s.trigger_characters.as_slice())
            .unwrap_or_default()
    }
}

fn provider_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Object(_) => true,
        _ => false,
    })
}

fn provider_options<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(true) => Some(T::default()),
        value @ Value::Object(_) => Some(serde_json::from_value(value).unwrap_or_default()),
        _ => None,
    })
}

fn sync_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TextDocumentSyncKind, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let kind = match &value {
        Value::Number(_) => value.clone(),
        Value::Object(options) => options.get("change").cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    };
    Ok(serde_json::from_value(kind).unwrap_or_default())
}

/// Initialize result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

/// Server info
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

// ============================================================================
// Shared Wire Fragments
// ============================================================================

/// Markup content
#[derive(Debug, Clone, Deserialize)]
pub struct MarkupContent {
    pub kind: String,
    pub value: String,
}

/// Documentation: plain string or markup
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Documentation {
    String(String),
    Markup(MarkupContent),
}

impl Documentation {
    pub fn into_text(self) -> String {
        match self {
            Self::String(s) => s,
            Self::Markup(m) => m.value,
        }
    }
}

fn documentation_text(doc: Option<Documentation>) -> Option<String> {
    doc.map(Documentation::into_text).filter(|s| !s.is_empty())
}

// ============================================================================
// Diagnostics
// ============================================================================

/// LSP Diagnostic as sent on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspDiagnostic {
    pub range: Range,
    #[serde(default)]
    pub severity: Option<i64>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl From<LspDiagnostic> for Diagnostic {
    fn from(diag: LspDiagnostic) -> Self {
        let code = match diag.code {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self {
            range: diag.range,
            // An omitted severity is reported as an error
            severity: diag
                .severity
                .map(DiagnosticSeverity::from_lsp)
                .unwrap_or(DiagnosticSeverity::Error),
            code,
            source: diag.source,
            message: diag.message,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub diagnostics: Vec<LspDiagnostic>,
}

impl From<PublishDiagnosticsParams> for PublishedDiagnostics {
    fn from(params: PublishDiagnosticsParams) -> Self {
        Self {
            uri: params.uri,
            version: params.version,
            diagnostics: params.diagnostics.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Hover
// ============================================================================

/// Hover result
#[derive(Debug, Clone, Deserialize)]
pub struct LspHover {
    pub contents: HoverContents,
    #[serde(default)]
    pub range: Option<Range>,
}

/// Hover contents
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HoverContents {
    Markup(MarkupContent),
    Marked(MarkedString),
    Array(Vec<MarkedString>),
}

/// Marked string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MarkedString {
    String(String),
    LanguageString { language: String, value: String },
}

impl MarkedString {
    fn into_markdown(self) -> String {
        match self {
            Self::String(s) => s,
            Self::LanguageString { language, value } => {
                format!("```{language}\n{value}\n```")
            }
        }
    }
}

impl HoverContents {
    pub fn into_text(self) -> String {
        match self {
            Self::Markup(m) => m.value,
            Self::Marked(m) => m.into_markdown(),
            Self::Array(items) => items
                .into_iter()
                .map(MarkedString::into_markdown)
                .filter(|s| !s.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

impl LspHover {
    /// `None` when the server answered with empty contents
    pub fn into_hover(self) -> Option<Hover> {
        let contents = self.contents.into_text();
        if contents.trim().is_empty() {
            return None;
        }
        Some(Hover {
            contents,
            range: self.range,
        })
    }
}

// ============================================================================
// Locations
// ============================================================================

/// LocationLink - used by some servers for definition responses
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationLink {
    pub target_uri: String,
    #[serde(default)]
    pub target_range: Range,
    #[serde(default)]
    pub target_selection_range: Range,
}

impl From<LocationLink> for Location {
    fn from(link: LocationLink) -> Self {
        Self {
            uri: link.target_uri,
            range: link.target_selection_range,
        }
    }
}

/// `Location | Location[] | LocationLink[]`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LocationResponse {
    Scalar(Location),
    Array(Vec<Location>),
    Links(Vec<LocationLink>),
}

impl From<LocationResponse> for Vec<Location> {
    fn from(response: LocationResponse) -> Self {
        match response {
            LocationResponse::Scalar(loc) => vec![loc],
            LocationResponse::Array(locs) => locs,
            LocationResponse::Links(links) => links.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Completion edit: plain `TextEdit` or `InsertReplaceEdit`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CompletionTextEdit {
    Edit(TextEdit),
    #[serde(rename_all = "camelCase")]
    InsertReplace {
        insert: Range,
        replace: Range,
        new_text: String,
    },
}

impl From<CompletionTextEdit> for TextEdit {
    fn from(edit: CompletionTextEdit) -> Self {
        match edit {
            CompletionTextEdit::Edit(edit) => edit,
            CompletionTextEdit::InsertReplace {
                insert, new_text, ..
            } => TextEdit {
                range: insert,
                new_text,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspCompletionItem {
    pub label: String,
    #[serde(default)]
    pub kind: Option<u32>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub documentation: Option<Documentation>,
    #[serde(default)]
    pub insert_text: Option<String>,
    #[serde(default)]
    pub insert_text_format: Option<u32>,
    #[serde(default)]
    pub filter_text: Option<String>,
    #[serde(default)]
    pub sort_text: Option<String>,
    #[serde(default)]
    pub text_edit: Option<CompletionTextEdit>,
    #[serde(default)]
    pub additional_text_edits: Option<Vec<TextEdit>>,
    #[serde(default)]
    pub commit_characters: Option<Vec<String>>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<LspCompletionItem> for CompletionItem {
    fn from(item: LspCompletionItem) -> Self {
        Self {
            label: item.label,
            kind: item.kind,
            detail: item.detail,
            documentation: documentation_text(item.documentation),
            insert_text: item.insert_text,
            insert_text_format: item.insert_text_format,
            filter_text: item.filter_text,
            sort_text: item.sort_text,
            text_edit: item.text_edit.map(Into::into),
            additional_text_edits: item.additional_text_edits.unwrap_or_default(),
            commit_characters: item.commit_characters.unwrap_or_default(),
            data: item.data,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspCompletionList {
    #[serde(default)]
    pub is_incomplete: bool,
    #[serde(default)]
    pub items: Vec<LspCompletionItem>,
}

/// `CompletionItem[] | CompletionList`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CompletionResponse {
    Array(Vec<LspCompletionItem>),
    List(LspCompletionList),
}

impl From<CompletionResponse> for CompletionList {
    fn from(response: CompletionResponse) -> Self {
        let (is_incomplete, items) = match response {
            CompletionResponse::Array(items) => (false, items),
            CompletionResponse::List(list) => (list.is_incomplete, list.items),
        };
        Self {
            is_incomplete,
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Document Symbols
// ============================================================================

/// Symbol information (flat form)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInformation {
    pub name: String,
    pub kind: u32,
    pub location: Location,
    #[serde(default)]
    pub container_name: Option<String>,
}

impl From<SymbolInformation> for DocumentSymbol {
    fn from(info: SymbolInformation) -> Self {
        Self {
            name: info.name,
            detail: info.container_name,
            kind: info.kind,
            range: info.location.range,
            selection_range: info.location.range,
            children: Vec::new(),
        }
    }
}

/// `DocumentSymbol[] | SymbolInformation[]`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DocumentSymbolResponse {
    Nested(Vec<DocumentSymbol>),
    Flat(Vec<SymbolInformation>),
}

impl From<DocumentSymbolResponse> for Vec<DocumentSymbol> {
    fn from(response: DocumentSymbolResponse) -> Self {
        match response {
            DocumentSymbolResponse::Nested(symbols) => symbols,
            DocumentSymbolResponse::Flat(infos) => infos.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Signature Help
// ============================================================================

/// Parameter label: substring, or UTF-16 offsets into the signature label
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParameterLabel {
    Simple(String),
    Offsets([u32; 2]),
}

impl ParameterLabel {
    fn resolve(self, signature_label: &str) -> String {
        match self {
            Self::Simple(s) => s,
            Self::Offsets([start, end]) => {
                let units: Vec<u16> = signature_label.encode_utf16().collect();
                let end = (end as usize).min(units.len());
                let start = (start as usize).min(end);
                String::from_utf16_lossy(&units[start..end])
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LspParameterInformation {
    pub label: ParameterLabel,
    #[serde(default)]
    pub documentation: Option<Documentation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspSignatureInformation {
    pub label: String,
    #[serde(default)]
    pub documentation: Option<Documentation>,
    #[serde(default)]
    pub parameters: Option<Vec<LspParameterInformation>>,
    #[serde(default)]
    pub active_parameter: Option<u32>,
}

impl From<LspSignatureInformation> for SignatureInformation {
    fn from(sig: LspSignatureInformation) -> Self {
        let parameters = sig
            .parameters
            .unwrap_or_default()
            .into_iter()
            .map(|p| ParameterInformation {
                label: p.label.resolve(&sig.label),
                documentation: documentation_text(p.documentation),
            })
            .collect();
        Self {
            documentation: documentation_text(sig.documentation),
            parameters,
            active_parameter: sig.active_parameter,
            label: sig.label,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspSignatureHelp {
    #[serde(default)]
    pub signatures: Vec<LspSignatureInformation>,
    #[serde(default)]
    pub active_signature: Option<u32>,
    #[serde(default)]
    pub active_parameter: Option<u32>,
}

impl LspSignatureHelp {
    /// `None` when no signatures were offered
    pub fn into_signature_help(self) -> Option<SignatureHelp> {
        if self.signatures.is_empty() {
            return None;
        }
        Some(SignatureHelp {
            signatures: self.signatures.into_iter().map(Into::into).collect(),
            active_signature: self.active_signature.unwrap_or(0),
            active_parameter: self.active_parameter.unwrap_or(0),
        })
    }
}

// ============================================================================
// Workspace Edits
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentEdit {
    pub text_document: TextDocumentIdentifier,
    #[serde(default)]
    pub edits: Vec<TextEdit>,
}

/// `documentChanges` entry: text edits, or a resource operation we do not model
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DocumentChange {
    Edit(TextDocumentEdit),
    Operation(Value),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspWorkspaceEdit {
    #[serde(default)]
    pub changes: Option<HashMap<String, Vec<TextEdit>>>,
    #[serde(default)]
    pub document_changes: Option<Vec<DocumentChange>>,
}

impl From<LspWorkspaceEdit> for WorkspaceEdit {
    fn from(edit: LspWorkspaceEdit) -> Self {
        let mut changes = edit.changes.unwrap_or_default();
        for change in edit.document_changes.unwrap_or_default() {
            match change {
                DocumentChange::Edit(doc_edit) => changes
                    .entry(doc_edit.text_document.uri)
                    .or_default()
                    .extend(doc_edit.edits),
                DocumentChange::Operation(op) => {
                    let kind = op.get("kind").and_then(Value::as_str).unwrap_or("unknown");
                    tracing::debug!("Ignoring workspace resource operation: {}", kind);
                }
            }
        }
        Self { changes }
    }
}

// ============================================================================
// Code Actions
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspCodeAction {
    pub title: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub diagnostics: Option<Vec<LspDiagnostic>>,
    #[serde(default)]
    pub is_preferred: bool,
    #[serde(default)]
    pub edit: Option<LspWorkspaceEdit>,
    #[serde(default)]
    pub command: Option<Command>,
}

/// `(Command | CodeAction)[]` element
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CodeActionOrCommand {
    Action(LspCodeAction),
    Command(Command),
}

impl From<CodeActionOrCommand> for CodeAction {
    fn from(item: CodeActionOrCommand) -> Self {
        match item {
            CodeActionOrCommand::Action(action) => Self {
                title: action.title,
                kind: action.kind,
                diagnostics: action
                    .diagnostics
                    .unwrap_or_default()
                    .into_iter()
                    .map(Into::into)
                    .collect(),
                is_preferred: action.is_preferred,
                edit: action.edit.map(Into::into),
                command: action.command,
            },
            CodeActionOrCommand::Command(command) => Self {
                title: command.title.clone(),
                kind: None,
                diagnostics: Vec::new(),
                is_preferred: false,
                edit: None,
                command: Some(command),
            },
        }
    }
}

// ============================================================================
// Rename
// ============================================================================

/// `Range | { range, placeholder } | { defaultBehavior }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PrepareRenameResponse {
    Range(Range),
    RangeWithPlaceholder {
        range: Range,
        placeholder: String,
    },
    DefaultBehavior {
        #[serde(rename = "defaultBehavior")]
        default_behavior: bool,
    },
}

impl PrepareRenameResponse {
    /// `None` when the server says the position cannot be renamed
    pub fn into_result(self) -> Option<PrepareRenameResult> {
        match self {
            Self::Range(range) => Some(PrepareRenameResult {
                range: Some(range),
                placeholder: None,
            }),
            Self::RangeWithPlaceholder { range, placeholder } => Some(PrepareRenameResult {
                range: Some(range),
                placeholder: Some(placeholder),
            }),
            Self::DefaultBehavior { default_behavior } => {
                default_behavior.then_some(PrepareRenameResult {
                    range: None,
                    placeholder: None,
                })
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lsp::Position;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = Request::new(1, "initialize", Some(json!({})));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
    }

    #[test]
    fn test_notification_omits_params_when_none() {
        let json = serde_json::to_value(Notification::new("exit", None)).unwrap();
        assert_eq!(json, json!({ "jsonrpc": "2.0", "method": "exit" }));
    }

    #[test]
    fn test_message_classification() {
        let resp = Message::parse(br#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(matches!(resp, Message::Response(_)));

        let notif =
            Message::parse(br#"{"jsonrpc":"2.0","method":"window/logMessage","params":{}}"#)
                .unwrap();
        assert!(matches!(notif, Message::Notification(_)));

        let req = Message::parse(
            br#"{"jsonrpc":"2.0","id":"a","method":"workspace/configuration","params":{}}"#,
        )
        .unwrap();
        assert!(matches!(req, Message::Request(_)));

        assert!(Message::parse(br#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(Message::parse(b"garbage").is_err());
    }

    #[test]
    fn test_error_response() {
        let json = br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let Message::Response(resp) = Message::parse(json).unwrap() else {
            panic!("expected response");
        };
        assert!(!resp.is_success());
        assert_eq!(
            resp.into_result().unwrap_err().code,
            error_codes::METHOD_NOT_FOUND
        );
    }

    #[test]
    fn test_request_id_as_number() {
        assert_eq!(RequestId::Number(5).as_number(), Some(5));
        assert_eq!(RequestId::String("7".to_string()).as_number(), Some(7));
        assert_eq!(RequestId::String("abc".to_string()).as_number(), None);
    }

    #[test]
    fn test_server_capabilities_bool_or_options() {
        let caps: ServerCapabilities = serde_json::from_value(json!({
            "textDocumentSync": { "openClose": true, "change": 2 },
            "hoverProvider": true,
            "definitionProvider": { "workDoneProgress": true },
            "referencesProvider": false,
            "completionProvider": { "triggerCharacters": [".", ":"], "resolveProvider": true },
            "signatureHelpProvider": { "triggerCharacters": ["("] },
            "renameProvider": { "prepareProvider": true },
            "semanticTokensProvider": { "legend": {} }
        }))
        .unwrap();

        assert_eq!(caps.text_document_sync, TextDocumentSyncKind::Incremental);
        assert!(caps.hover_provider);
        assert!(caps.definition_provider);
        assert!(!caps.references_provider);
        assert!(!caps.document_formatting_provider);
        assert!(caps.supports_completion_resolve());
        assert_eq!(caps.completion_triggers(), [".", ":"]);
        assert_eq!(caps.signature_help_triggers(), ["("]);
        assert!(caps.supports_prepare_rename());
    }

    #[test]
    fn test_server_capabilities_defaults_to_unsupported() {
        let caps: ServerCapabilities = serde_json::from_value(json!({})).unwrap();
        assert_eq!(caps, ServerCapabilities::default());
        assert!(!caps.supports_completion());
        assert!(caps.completion_triggers().is_empty());

        let caps: ServerCapabilities =
            serde_json::from_value(json!({ "textDocumentSync": 1, "renameProvider": true }))
                .unwrap();
        assert_eq!(caps.text_document_sync, TextDocumentSyncKind::Full);
        assert!(caps.supports_rename());
        assert!(!caps.supports_prepare_rename());
    }

    #[test]
    fn test_publish_diagnostics_conversion() {
        let params: PublishDiagnosticsParams = serde_json::from_value(json!({
            "uri": "file:///a/b.bas",
            "version": 3,
            "diagnostics": [
                {
                    "range": { "start": { "line": 4, "character": 2 }, "end": { "line": 4, "character": 9 } },
                    "severity": 1,
                    "code": 1001,
                    "source": "basiclang",
                    "message": "Undeclared variable 'x'"
                },
                {
                    "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } },
                    "message": "no severity"
                }
            ]
        }))
        .unwrap();

        let published = PublishedDiagnostics::from(params);
        assert_eq!(published.version, Some(3));
        assert_eq!(published.diagnostics.len(), 2);

        let first = &published.diagnostics[0];
        assert_eq!(first.severity, DiagnosticSeverity::Error);
        assert_eq!(first.code.as_deref(), Some("1001"));
        assert_eq!(first.range.start, Position::new(4, 2));
        assert_eq!(published.diagnostics[1].severity, DiagnosticSeverity::Error);
    }

    #[test]
    fn test_hover_contents_variants() {
        let markup: LspHover =
            serde_json::from_value(json!({ "contents": { "kind": "markdown", "value": "**Int**" } }))
                .unwrap();
        assert_eq!(markup.into_hover().unwrap().contents, "**Int**");

        let lang: LspHover = serde_json::from_value(
            json!({ "contents": { "language": "basic", "value": "DIM x AS INTEGER" } }),
        )
        .unwrap();
        assert_eq!(
            lang.into_hover().unwrap().contents,
            "```basic\nDIM x AS INTEGER\n```"
        );

        let array: LspHover =
            serde_json::from_value(json!({ "contents": ["first", "", { "language": "go", "value": "func f()" }] }))
                .unwrap();
        assert_eq!(
            array.into_hover().unwrap().contents,
            "first\n\n```go\nfunc f()\n```"
        );

        let empty: LspHover = serde_json::from_value(json!({ "contents": "" })).unwrap();
        assert!(empty.into_hover().is_none());
    }

    #[test]
    fn test_location_response_variants() {
        let scalar: LocationResponse = serde_json::from_value(json!({
            "uri": "file:///a.go",
            "range": { "start": { "line": 1, "character": 0 }, "end": { "line": 1, "character": 4 } }
        }))
        .unwrap();
        assert_eq!(Vec::<Location>::from(scalar).len(), 1);

        let links: LocationResponse = serde_json::from_value(json!([{
            "targetUri": "file:///b.rs",
            "targetRange": { "start": { "line": 0, "character": 0 }, "end": { "line": 9, "character": 1 } },
            "targetSelectionRange": { "start": { "line": 2, "character": 4 }, "end": { "line": 2, "character": 8 } }
        }]))
        .unwrap();
        let locations = Vec::<Location>::from(links);
        assert_eq!(locations[0].uri, "file:///b.rs");
        assert_eq!(locations[0].range.start, Position::new(2, 4));

        let empty: LocationResponse = serde_json::from_value(json!([])).unwrap();
        assert!(Vec::<Location>::from(empty).is_empty());
    }

    #[test]
    fn test_completion_response_variants() {
        let array: CompletionResponse =
            serde_json::from_value(json!([{ "label": "PRINT", "kind": 14 }])).unwrap();
        let list = CompletionList::from(array);
        assert!(!list.is_incomplete);
        assert_eq!(list.items[0].label, "PRINT");

        let incomplete: CompletionResponse = serde_json::from_value(json!({
            "isIncomplete": true,
            "items": [{
                "label": "len",
                "documentation": { "kind": "markdown", "value": "Returns the length" },
                "textEdit": {
                    "insert": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 2 } },
                    "replace": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 5 } },
                    "newText": "len()"
                }
            }]
        }))
        .unwrap();
        let list = CompletionList::from(incomplete);
        assert!(list.is_incomplete);
        let item = &list.items[0];
        assert_eq!(item.documentation.as_deref(), Some("Returns the length"));
        let edit = item.text_edit.as_ref().unwrap();
        assert_eq!(edit.new_text, "len()");
        assert_eq!(edit.range.end, Position::new(0, 2));
    }

    #[test]
    fn test_document_symbol_variants() {
        let nested: DocumentSymbolResponse = serde_json::from_value(json!([{
            "name": "Module1",
            "kind": 2,
            "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 20, "character": 0 } },
            "selectionRange": { "start": { "line": 0, "character": 7 }, "end": { "line": 0, "character": 14 } },
            "children": [{
                "name": "Main",
                "kind": 12,
                "range": { "start": { "line": 2, "character": 0 }, "end": { "line": 5, "character": 0 } },
                "selectionRange": { "start": { "line": 2, "character": 4 }, "end": { "line": 2, "character": 8 } }
            }]
        }]))
        .unwrap();
        let symbols = Vec::<DocumentSymbol>::from(nested);
        assert_eq!(symbols[0].children[0].name, "Main");

        let flat: DocumentSymbolResponse = serde_json::from_value(json!([{
            "name": "helper",
            "kind": 12,
            "containerName": "utils",
            "location": {
                "uri": "file:///u.py",
                "range": { "start": { "line": 3, "character": 0 }, "end": { "line": 4, "character": 0 } }
            }
        }]))
        .unwrap();
        let symbols = Vec::<DocumentSymbol>::from(flat);
        assert_eq!(symbols[0].detail.as_deref(), Some("utils"));
        assert!(symbols[0].children.is_empty());
        assert_eq!(symbols[0].range.start.line, 3);
    }

    #[test]
    fn test_signature_help_offset_labels() {
        let help: LspSignatureHelp = serde_json::from_value(json!({
            "signatures": [{
                "label": "Mid(s, start, length)",
                "documentation": "Returns a substring",
                "parameters": [
                    { "label": [4, 5] },
                    { "label": "start" },
                    { "label": [14, 99] }
                ]
            }],
            "activeParameter": 1
        }))
        .unwrap();
        let help = help.into_signature_help().unwrap();
        let sig = help.active().unwrap();
        let labels: Vec<_> = sig.parameters.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["s", "start", "length)"]);
        assert_eq!(help.active_parameter, 1);
        assert_eq!(sig.documentation.as_deref(), Some("Returns a substring"));

        let empty: LspSignatureHelp = serde_json::from_value(json!({ "signatures": [] })).unwrap();
        assert!(empty.into_signature_help().is_none());
    }

    #[test]
    fn test_workspace_edit_merges_document_changes() {
        let edit: LspWorkspaceEdit = serde_json::from_value(json!({
            "changes": {
                "file:///a.bas": [{ "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } }, "newText": "y" }]
            },
            "documentChanges": [
                {
                    "textDocument": { "uri": "file:///a.bas", "version": 2 },
                    "edits": [{ "range": { "start": { "line": 5, "character": 0 }, "end": { "line": 5, "character": 1 } }, "newText": "y", "annotationId": "r" }]
                },
                { "kind": "create", "uri": "file:///new.bas" }
            ]
        }))
        .unwrap();
        let edit = WorkspaceEdit::from(edit);
        assert_eq!(edit.changes.len(), 1);
        assert_eq!(edit.changes["file:///a.bas"].len(), 2);
    }

    #[test]
    fn test_code_action_or_command() {
        let items: Vec<CodeActionOrCommand> = serde_json::from_value(json!([
            { "title": "Organize imports", "command": "source.organize", "arguments": ["file:///a.py"] },
            {
                "title": "Declare variable",
                "kind": "quickfix",
                "isPreferred": true,
                "diagnostics": [{
                    "range": { "start": { "line": 4, "character": 0 }, "end": { "line": 4, "character": 1 } },
                    "severity": 1,
                    "message": "Undeclared"
                }],
                "edit": { "changes": { "file:///a.bas": [] } }
            }
        ]))
        .unwrap();
        let actions: Vec<CodeAction> = items.into_iter().map(Into::into).collect();

        assert_eq!(actions[0].title, "Organize imports");
        assert_eq!(
            actions[0].command.as_ref().map(|c| c.command.as_str()),
            Some("source.organize")
        );
        assert!(actions[0].edit.is_none());

        assert!(actions[1].is_quick_fix());
        assert!(actions[1].is_preferred);
        assert_eq!(actions[1].diagnostics.len(), 1);
        assert!(actions[1].edit.is_some());
    }

    #[test]
    fn test_prepare_rename_variants() {
        let range: PrepareRenameResponse = serde_json::from_value(json!({
            "start": { "line": 1, "character": 2 }, "end": { "line": 1, "character": 5 }
        }))
        .unwrap();
        assert!(range.into_result().unwrap().range.is_some());

        let placeholder: PrepareRenameResponse = serde_json::from_value(json!({
            "range": { "start": { "line": 1, "character": 2 }, "end": { "line": 1, "character": 5 } },
            "placeholder": "total"
        }))
        .unwrap();
        assert_eq!(
            placeholder.into_result().unwrap().placeholder.as_deref(),
            Some("total")
        );

        let refused: PrepareRenameResponse =
            serde_json::from_value(json!({ "defaultBehavior": false })).unwrap();
        assert!(refused.into_result().is_none());
    }
}
