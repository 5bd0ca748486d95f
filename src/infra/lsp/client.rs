use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::launcher::{ServerConnection, ServerLauncher};
use super::protocol::{
    ClientCapabilities, ClientInfo, CodeActionOrCommand, CompletionResponse, DocumentSymbolResponse,
    InitializeParams, InitializeResult, LocationResponse, LspCompletionItem, LspHover,
    LspSignatureHelp, LspWorkspaceEdit, Message, Notification, PrepareRenameResponse,
    PublishDiagnosticsParams, Request, Response, ResponseError, ServerCapabilities, ServerInfo,
    TextDocumentClientCapabilities, WindowClientCapabilities, WorkspaceClientCapabilities,
    WorkspaceFolder, error_codes,
};
use super::transport::{FrameReader, FrameWriter, encode_message};
use crate::error::LspError;
use crate::infra::{lock, read_lock, write_lock};
use crate::models::diagnostic::{Diagnostic, PublishedDiagnostics};
use crate::models::lsp::{
    CodeAction, CompletionItem, CompletionList, DocumentSymbol, Hover, Location, Position,
    PrepareRenameResult, Range, SignatureHelp, TextEdit, WorkspaceEdit, path_to_uri,
};
use crate::models::server::LanguageServerConfig;

type PendingResult = Result<Value, ResponseError>;
type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<PendingResult>>>>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Runtime knobs for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Buffered events per subscriber before it starts lagging
    pub event_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Initializing = 1,
    Connected = 2,
    Failed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Connected,
            3 => Self::Failed,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Initializing => "initializing",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Server-originated event, delivered to every subscriber
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Notification { method: String, params: Value },
    Diagnostics(PublishedDiagnostics),
}

enum WriterCommand {
    Send(Vec<u8>),
    Close,
}

struct ClientIo {
    writer_tx: mpsc::UnboundedSender<WriterCommand>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    process: Option<Child>,
}

/// JSON-RPC session with one language server
pub struct LspClient {
    config: LanguageServerConfig,
    language_id: String,
    options: ClientOptions,
    launcher: Arc<dyn ServerLauncher>,
    state: Arc<AtomicU8>,
    next_id: AtomicU64,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
    started: AtomicBool,
    disposed: AtomicBool,
    capabilities: RwLock<Option<ServerCapabilities>>,
    server_info: RwLock<Option<ServerInfo>>,
    events: broadcast::Sender<ClientEvent>,
    io: Mutex<Option<ClientIo>>,
}

impl LspClient {
    pub fn new(
        config: LanguageServerConfig,
        language_id: impl Into<String>,
        launcher: Arc<dyn ServerLauncher>,
        options: ClientOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            config,
            language_id: language_id.into(),
            options,
            launcher,
            state: Arc::new(AtomicU8::new(SessionState::Disconnected as u8)),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(true)),
            started: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            capabilities: RwLock::new(None),
            server_info: RwLock::new(None),
            events,
            io: Mutex::new(None),
        }
    }

    /// Launch the server and run the `initialize` handshake
    ///
    /// A session runs once: on any client that is no longer fresh this
    /// returns `is_connected()` without side effects.
    pub async fn initialize(&self, workspace_root: &Path) -> bool {
        if self.disposed.load(Ordering::SeqCst)
            || self.state() != SessionState::Disconnected
            || self.started.swap(true, Ordering::SeqCst)
        {
            return self.is_connected();
        }
        self.set_state(SessionState::Initializing);

        match self.handshake(workspace_root).await {
            Ok(()) => {
                self.set_state(SessionState::Connected);
                // The reader may have seen EOF before Connected was stored
                if self.closed.load(Ordering::SeqCst) {
                    mark_disconnected(&self.state);
                    tracing::warn!("{} language server exited during startup", self.id());
                    return false;
                }
                tracing::info!("{} language server started successfully", self.id());
                true
            }
            Err(e) => {
                tracing::warn!("Failed to initialize {} language server: {}", self.id(), e);
                self.set_state(SessionState::Failed);
                false
            }
        }
    }

    async fn handshake(&self, workspace_root: &Path) -> Result<(), LspError> {
        let connection = self.launcher.launch(&self.config, workspace_root).await?;
        self.attach(connection);

        let root_uri = path_to_uri(workspace_root);
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri.clone()),
            root_path: Some(workspace_root.to_string_lossy().into_owned()),
            capabilities: Self::client_capabilities(),
            client_info: Some(ClientInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            initialization_options: self.config.initialization_options.clone(),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: workspace_root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "workspace".to_string()),
            }]),
        };

        tracing::debug!(
            "Initializing {} LSP with options: {:?}",
            self.id(),
            params.initialization_options.is_some()
        );

        let result = self
            .request(
                "initialize",
                Some(serde_json::to_value(params)?),
                self.options.request_timeout,
            )
            .await?;
        if result.is_null() {
            return Err(LspError::Protocol(
                "initialize returned a null result".to_string(),
            ));
        }

        let result: InitializeResult = serde_json::from_value(result)?;
        if let Some(info) = &result.server_info {
            tracing::debug!(
                "{} reports server {} {}",
                self.id(),
                info.name,
                info.version.as_deref().unwrap_or("")
            );
        }
        *write_lock(&self.capabilities) = Some(result.capabilities);
        *write_lock(&self.server_info) = result.server_info;

        if !self.notify("initialized", Some(json!({}))) {
            return Err(LspError::ConnectionClosed);
        }
        Ok(())
    }

    /// Wire up reader and writer tasks for a fresh connection
    fn attach(&self, connection: ServerConnection) {
        self.teardown_io();

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        self.closed.store(false, Ordering::SeqCst);

        let writer = tokio::spawn(write_loop(
            FrameWriter::new(connection.writer),
            writer_rx,
            self.id().to_string(),
            self.closed.clone(),
            self.pending.clone(),
        ));

        let dispatcher = Dispatcher {
            server_id: self.id().to_string(),
            pending: self.pending.clone(),
            closed: self.closed.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            writer: writer_tx.clone(),
        };
        let reader = tokio::spawn(dispatcher.run(FrameReader::new(connection.reader)));

        *lock(&self.io) = Some(ClientIo {
            writer_tx,
            reader,
            writer,
            process: connection.process,
        });
    }

    /// Fixed capability set declared to every server
    fn client_capabilities() -> ClientCapabilities {
        let window = WindowClientCapabilities {
            work_done_progress: Some(true),
            show_message: Some(json!({
                "messageActionItem": { "additionalPropertiesSupport": false }
            })),
        };

        let text_document = TextDocumentClientCapabilities {
            synchronization: Some(json!({
                "dynamicRegistration": false,
                "willSave": false,
                "willSaveWaitUntil": false,
                "didSave": true
            })),
            completion: Some(json!({
                "dynamicRegistration": false,
                "contextSupport": true,
                "completionItem": {
                    "snippetSupport": true,
                    "commitCharactersSupport": true,
                    "documentationFormat": ["markdown", "plaintext"],
                    "deprecatedSupport": true,
                    "preselectSupport": true,
                    "insertReplaceSupport": true,
                    "resolveSupport": {
                        "properties": ["documentation", "detail", "additionalTextEdits"]
                    }
                },
                "completionItemKind": {
                    "valueSet": (1..=25).collect::<Vec<_>>()
                }
            })),
            hover: Some(json!({
                "dynamicRegistration": false,
                "contentFormat": ["markdown", "plaintext"]
            })),
            signature_help: Some(json!({
                "dynamicRegistration": false,
                "signatureInformation": {
                    "documentationFormat": ["markdown", "plaintext"],
                    "parameterInformation": { "labelOffsetSupport": true },
                    "activeParameterSupport": true
                },
                "contextSupport": true
            })),
            definition: Some(json!({
                "dynamicRegistration": false,
                "linkSupport": true
            })),
            references: Some(json!({
                "dynamicRegistration": false
            })),
            document_symbol: Some(json!({
                "dynamicRegistration": false,
                "symbolKind": {
                    "valueSet": (1..=26).collect::<Vec<_>>()
                },
                "hierarchicalDocumentSymbolSupport": true
            })),
            code_action: Some(json!({
                "dynamicRegistration": false,
                "isPreferredSupport": true,
                "codeActionLiteralSupport": {
                    "codeActionKind": {
                        "valueSet": [
                            "", "quickfix", "refactor", "refactor.extract", "refactor.inline",
                            "refactor.rewrite", "source", "source.organizeImports", "source.fixAll"
                        ]
                    }
                }
            })),
            formatting: Some(json!({
                "dynamicRegistration": false
            })),
            range_formatting: Some(json!({
                "dynamicRegistration": false
            })),
            rename: Some(json!({
                "dynamicRegistration": false,
                "prepareSupport": true,
                "prepareSupportDefaultBehavior": 1
            })),
            publish_diagnostics: Some(json!({
                "relatedInformation": false,
                "versionSupport": true,
                "codeDescriptionSupport": false
            })),
        };

        let workspace = WorkspaceClientCapabilities {
            apply_edit: Some(false),
            workspace_edit: Some(json!({
                "documentChanges": true,
                "resourceOperations": []
            })),
            workspace_folders: Some(true),
            configuration: Some(true),
        };

        ClientCapabilities {
            window: Some(window),
            text_document: Some(text_document),
            workspace: Some(workspace),
        }
    }

    /// Graceful stop: `shutdown` then `exit`, errors swallowed
    pub async fn shutdown(&self) {
        let was_connected = self.is_connected();
        self.set_state(SessionState::Disconnected);

        if was_connected {
            if let Err(e) = self
                .request("shutdown", None, self.options.shutdown_timeout)
                .await
            {
                tracing::debug!("{} shutdown request failed: {}", self.id(), e);
            }
            self.notify("exit", None);
        }

        let Some(mut io) = lock(&self.io).take() else {
            return;
        };

        let _ = io.writer_tx.send(WriterCommand::Close);
        drop(io.writer_tx);
        if timeout(self.options.shutdown_timeout, &mut io.writer)
            .await
            .is_err()
        {
            io.writer.abort();
        }

        if let Some(mut child) = io.process.take() {
            match timeout(self.options.shutdown_timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!("{} language server exited: {:?}", self.id(), status);
                }
                Ok(Err(e)) => {
                    tracing::warn!("{} language server wait error: {}", self.id(), e);
                }
                Err(_) => {
                    tracing::warn!(
                        "{} language server termination timed out, forcing kill",
                        self.id()
                    );
                    let _ = child.kill().await;
                }
            }
        }

        io.reader.abort();
        mark_closed(&self.closed, &self.pending);
        tracing::info!("{} language server stopped", self.id());
    }

    /// Immediate teardown: tasks aborted, process killed, waiters released
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(SessionState::Disconnected);
        self.teardown_io();
        tracing::debug!("LspClient for {} disposed", self.id());
    }

    fn teardown_io(&self) {
        mark_closed(&self.closed, &self.pending);
        if let Some(mut io) = lock(&self.io).take() {
            io.reader.abort();
            io.writer.abort();
            if let Some(child) = io.process.as_mut() {
                let _ = child.start_kill();
            }
        }
    }

    /// Send a request and decode its result
    ///
    /// Every failure (not connected, timeout, server error, undecodable
    /// result, closed stream) is logged and reported as `None`, as is a
    /// null result. Dropping the returned future cancels the request.
    pub async fn send_request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Option<T> {
        if !self.is_connected() {
            tracing::debug!("{} not connected, skipping '{}'", self.id(), method);
            return None;
        }

        match self
            .request(method, params, self.options.request_timeout)
            .await
        {
            Ok(Value::Null) => None,
            Ok(value) => match serde_json::from_value(value) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!(
                        "Failed to decode '{}' result from {}: {}",
                        method,
                        self.id(),
                        e
                    );
                    None
                }
            },
            Err(LspError::ServerError { code, message }) => {
                tracing::warn!(
                    "{} returned error for '{}' [{}]: {}",
                    self.id(),
                    method,
                    code,
                    message
                );
                None
            }
            Err(e) if e.is_disconnect() => {
                tracing::debug!("'{}' on {} abandoned: {}", method, self.id(), e);
                None
            }
            Err(e) => {
                tracing::warn!("'{}' on {} failed: {}", method, self.id(), e);
                None
            }
        }
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        limit: Duration,
    ) -> Result<Value, LspError> {
        let writer = self.writer().ok_or(LspError::NotConnected)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let _guard = PendingGuard::register(&self.pending, id, tx, writer.clone());

        // Checked after registration so a concurrent close always releases us
        if self.closed.load(Ordering::SeqCst) {
            return Err(LspError::ConnectionClosed);
        }

        let frame = encode_message(&Request::new(id, method, params))?;
        tracing::trace!("{} LSP request {}: {}", self.id(), id, method);
        writer
            .send(WriterCommand::Send(frame))
            .map_err(|_| LspError::ConnectionClosed)?;

        match timeout(limit, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(err))) => Err(err.into()),
            Ok(Err(_)) => Err(LspError::ConnectionClosed),
            Err(_) => Err(LspError::Timeout {
                method: method.to_string(),
            }),
        }
    }

    /// Fire-and-forget; returns whether the message was queued
    pub fn send_notification(&self, method: &str, params: Option<Value>) -> bool {
        if !self.is_connected() {
            tracing::debug!("{} not connected, dropping '{}'", self.id(), method);
            return false;
        }
        self.notify(method, params)
    }

    fn notify(&self, method: &str, params: Option<Value>) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let Some(writer) = self.writer() else {
            return false;
        };
        match encode_message(&Notification::new(method, params)) {
            Ok(frame) => {
                tracing::trace!("{} LSP notification: {}", self.id(), method);
                writer.send(WriterCommand::Send(frame)).is_ok()
            }
            Err(e) => {
                tracing::warn!("Failed to encode '{}' notification: {}", method, e);
                false
            }
        }
    }

    fn writer(&self) -> Option<mpsc::UnboundedSender<WriterCommand>> {
        lock(&self.io).as_ref().map(|io| io.writer_tx.clone())
    }

    // ========================================================================
    // Document synchronization
    // ========================================================================

    pub fn did_open(&self, uri: &str, language_id: &str, version: i32, text: &str) -> bool {
        self.send_notification(
            "textDocument/didOpen",
            Some(json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": language_id,
                    "version": version,
                    "text": text
                }
            })),
        )
    }

    /// Full-document sync
    pub fn did_change(&self, uri: &str, version: i32, text: &str) -> bool {
        self.send_notification(
            "textDocument/didChange",
            Some(json!({
                "textDocument": { "uri": uri, "version": version },
                "contentChanges": [{ "text": text }]
            })),
        )
    }

    pub fn did_close(&self, uri: &str) -> bool {
        self.send_notification(
            "textDocument/didClose",
            Some(json!({ "textDocument": { "uri": uri } })),
        )
    }

    pub fn did_save(&self, uri: &str, text: Option<&str>) -> bool {
        let mut params = json!({ "textDocument": { "uri": uri } });
        if let Some(text) = text {
            params["text"] = Value::String(text.to_string());
        }
        self.send_notification("textDocument/didSave", Some(params))
    }

    // ========================================================================
    // Language features
    // ========================================================================

    fn position_params(uri: &str, position: Position) -> Value {
        json!({
            "textDocument": { "uri": uri },
            "position": position
        })
    }

    pub async fn completion(&self, uri: &str, position: Position) -> Option<CompletionList> {
        self.send_request::<CompletionResponse>(
            "textDocument/completion",
            Some(Self::position_params(uri, position)),
        )
        .await
        .map(Into::into)
    }

    /// Fill in lazily computed fields; without server support the item is
    /// returned unchanged
    pub async fn resolve_completion(&self, item: CompletionItem) -> Option<CompletionItem> {
        let supported = read_lock(&self.capabilities)
            .as_ref()
            .is_some_and(|c| c.supports_completion_resolve());
        if !supported {
            return Some(item);
        }

        let params = match serde_json::to_value(&item) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!("Failed to encode completion item '{}': {}", item.label, e);
                return Some(item);
            }
        };
        self.send_request::<LspCompletionItem>("completionItem/resolve", Some(params))
            .await
            .map(Into::into)
    }

    pub async fn hover(&self, uri: &str, position: Position) -> Option<Hover> {
        self.send_request::<LspHover>(
            "textDocument/hover",
            Some(Self::position_params(uri, position)),
        )
        .await
        .and_then(LspHover::into_hover)
    }

    pub async fn definition(&self, uri: &str, position: Position) -> Option<Vec<Location>> {
        self.send_request::<LocationResponse>(
            "textDocument/definition",
            Some(Self::position_params(uri, position)),
        )
        .await
        .map(Into::into)
    }

    pub async fn references(
        &self,
        uri: &str,
        position: Position,
        include_declaration: bool,
    ) -> Option<Vec<Location>> {
        let mut params = Self::position_params(uri, position);
        params["context"] = json!({ "includeDeclaration": include_declaration });
        self.send_request::<LocationResponse>("textDocument/references", Some(params))
            .await
            .map(Into::into)
    }

    pub async fn document_symbols(&self, uri: &str) -> Option<Vec<DocumentSymbol>> {
        self.send_request::<DocumentSymbolResponse>(
            "textDocument/documentSymbol",
            Some(json!({ "textDocument": { "uri": uri } })),
        )
        .await
        .map(Into::into)
    }

    pub async fn signature_help(&self, uri: &str, position: Position) -> Option<SignatureHelp> {
        self.send_request::<LspSignatureHelp>(
            "textDocument/signatureHelp",
            Some(Self::position_params(uri, position)),
        )
        .await
        .and_then(LspSignatureHelp::into_signature_help)
    }

    pub async fn code_actions(
        &self,
        uri: &str,
        range: Range,
        diagnostics: &[Diagnostic],
    ) -> Option<Vec<CodeAction>> {
        self.send_request::<Vec<CodeActionOrCommand>>(
            "textDocument/codeAction",
            Some(json!({
                "textDocument": { "uri": uri },
                "range": range,
                "context": { "diagnostics": diagnostics }
            })),
        )
        .await
        .map(|actions| actions.into_iter().map(Into::into).collect())
    }

    pub async fn formatting(
        &self,
        uri: &str,
        tab_size: u32,
        insert_spaces: bool,
    ) -> Option<Vec<TextEdit>> {
        self.send_request(
            "textDocument/formatting",
            Some(json!({
                "textDocument": { "uri": uri },
                "options": { "tabSize": tab_size, "insertSpaces": insert_spaces }
            })),
        )
        .await
    }

    pub async fn range_formatting(
        &self,
        uri: &str,
        range: Range,
        tab_size: u32,
        insert_spaces: bool,
    ) -> Option<Vec<TextEdit>> {
        self.send_request(
            "textDocument/rangeFormatting",
            Some(json!({
                "textDocument": { "uri": uri },
                "range": range,
                "options": { "tabSize": tab_size, "insertSpaces": insert_spaces }
            })),
        )
        .await
    }

    pub async fn prepare_rename(&self, uri: &str, position: Position) -> Option<PrepareRenameResult> {
        self.send_request::<PrepareRenameResponse>(
            "textDocument/prepareRename",
            Some(Self::position_params(uri, position)),
        )
        .await
        .and_then(PrepareRenameResponse::into_result)
    }

    pub async fn rename(
        &self,
        uri: &str,
        position: Position,
        new_name: &str,
    ) -> Option<WorkspaceEdit> {
        let mut params = Self::position_params(uri, position);
        params["newName"] = Value::String(new_name.to_string());
        self.send_request::<LspWorkspaceEdit>("textDocument/rename", Some(params))
            .await
            .map(Into::into)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Configuration id
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Language this client was spawned for
    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn config(&self) -> &LanguageServerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected && !self.closed.load(Ordering::SeqCst)
    }

    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        read_lock(&self.capabilities).clone()
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        read_lock(&self.server_info).clone()
    }

    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Removes its pending entry on every exit path; an entry still present at
/// drop time was abandoned, so the server is told to cancel it
struct PendingGuard {
    pending: PendingTable,
    id: u64,
    writer: mpsc::UnboundedSender<WriterCommand>,
}

impl PendingGuard {
    fn register(
        pending: &PendingTable,
        id: u64,
        tx: oneshot::Sender<PendingResult>,
        writer: mpsc::UnboundedSender<WriterCommand>,
    ) -> Self {
        lock(pending).insert(id, tx);
        Self {
            pending: pending.clone(),
            id,
            writer,
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let abandoned = lock(&self.pending).remove(&self.id).is_some();
        if abandoned
            && let Ok(frame) = encode_message(&Notification::new(
                "$/cancelRequest",
                Some(json!({ "id": self.id })),
            ))
        {
            let _ = self.writer.send(WriterCommand::Send(frame));
        }
    }
}

/// Reader-side state; owns no reference back to the client
struct Dispatcher {
    server_id: String,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    events: broadcast::Sender<ClientEvent>,
    writer: mpsc::UnboundedSender<WriterCommand>,
}

impl Dispatcher {
    async fn run<R: AsyncRead + Unpin>(self, mut reader: FrameReader<R>) {
        loop {
            match reader.read_frame().await {
                Ok(Some(body)) => self.dispatch(&body),
                Ok(None) => {
                    tracing::info!("{} language server closed its output", self.server_id);
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::info!("{} language server stream ended: {}", self.server_id, e);
                    break;
                }
                Err(e) => {
                    tracing::error!("{} LSP read error: {}", self.server_id, e);
                    break;
                }
            }
        }
        mark_closed(&self.closed, &self.pending);
        mark_disconnected(&self.state);
    }

    fn dispatch(&self, body: &[u8]) {
        match Message::parse(body) {
            Ok(Message::Response(response)) => self.resolve(response),
            Ok(Message::Request(request)) => self.answer(request),
            Ok(Message::Notification(notification)) => self.publish(notification),
            Err(e) => {
                tracing::warn!("Skipping malformed message from {}: {}", self.server_id, e);
            }
        }
    }

    fn resolve(&self, response: Response) {
        let Some(id) = response.id.as_ref().and_then(|id| id.as_number()) else {
            tracing::debug!("Dropping response without a usable id: {:?}", response.id);
            return;
        };

        let sender = lock(&self.pending).remove(&id);
        match sender {
            Some(tx) => {
                let _ = tx.send(response.into_result());
            }
            None => {
                tracing::debug!(
                    "Received response for unknown request ID {} (may have timed out)",
                    id
                );
            }
        }
    }

    /// Benign answers for the requests servers block on; everything else is
    /// `MethodNotFound`
    fn answer(&self, request: Request) {
        let result = match request.method.as_str() {
            "workspace/configuration" => {
                let items = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("items"))
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);
                Ok(Value::Array(vec![Value::Null; items]))
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create" => Ok(Value::Null),
            _ => {
                tracing::debug!(
                    "Unhandled server request from {}: {}",
                    self.server_id,
                    request.method
                );
                Err(ResponseError {
                    code: error_codes::METHOD_NOT_FOUND,
                    message: format!("Method not found: {}", request.method),
                    data: None,
                })
            }
        };

        let response = match result {
            Ok(value) => Response::success(request.id, value),
            Err(error) => Response::failure(request.id, error),
        };
        match encode_message(&response) {
            Ok(frame) => {
                let _ = self.writer.send(WriterCommand::Send(frame));
            }
            Err(e) => tracing::warn!("Failed to encode reply to server request: {}", e),
        }
    }

    fn publish(&self, notification: Notification) {
        let method = notification.method;
        let params = notification.params.unwrap_or(Value::Null);

        match method.as_str() {
            "textDocument/publishDiagnostics" => {
                match serde_json::from_value::<PublishDiagnosticsParams>(params.clone()) {
                    Ok(published) => {
                        let published = PublishedDiagnostics::from(published);
                        tracing::debug!(
                            "{} published {} diagnostics for {}",
                            self.server_id,
                            published.diagnostics.len(),
                            published.uri
                        );
                        let _ = self.events.send(ClientEvent::Diagnostics(published));
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Skipping malformed diagnostics from {}: {}",
                            self.server_id,
                            e
                        );
                    }
                }
            }
            "window/logMessage" | "window/showMessage" => {
                if let Some(msg) = params.get("message").and_then(Value::as_str) {
                    match params.get("type").and_then(Value::as_u64) {
                        Some(1) => tracing::error!("LSP {}: {}", self.server_id, msg),
                        Some(2) => tracing::warn!("LSP {}: {}", self.server_id, msg),
                        Some(3) => tracing::info!("LSP {}: {}", self.server_id, msg),
                        _ => tracing::debug!("LSP {}: {}", self.server_id, msg),
                    }
                }
            }
            _ => {
                tracing::trace!("Notification from {}: {}", self.server_id, method);
            }
        }

        // No receivers is fine
        let _ = self.events.send(ClientEvent::Notification { method, params });
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
    server_id: String,
    closed: Arc<AtomicBool>,
    pending: PendingTable,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Send(frame) => {
                if let Err(e) = writer.write_frame(&frame).await {
                    tracing::warn!("{} LSP write error: {}", server_id, e);
                    mark_closed(&closed, &pending);
                    break;
                }
            }
            WriterCommand::Close => {
                let _ = writer.close().await;
                break;
            }
        }
    }
}

/// Flag the stream as gone and release every waiter
fn mark_closed(closed: &AtomicBool, pending: &PendingTable) {
    closed.store(true, Ordering::SeqCst);
    let drained: Vec<_> = lock(pending).drain().collect();
    if !drained.is_empty() {
        tracing::debug!("Releasing {} pending requests", drained.len());
    }
}

/// Leave `Connected` once the stream is gone; other states are kept
fn mark_disconnected(state: &AtomicU8) {
    let _ = state.compare_exchange(
        SessionState::Connected as u8,
        SessionState::Disconnected as u8,
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
}
