//! In-process fake language server for client and manager tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::DuplexStream;

use super::launcher::{ServerConnection, ServerLauncher};
use super::transport::{FrameReader, FrameWriter};
use crate::error::LspError;
use crate::models::server::{LanguageServerConfig, ServerStartInfo};

/// A request received by the fake server
pub struct Incoming {
    pub id: Value,
    pub method: String,
    pub params: Value,
}

impl Incoming {
    pub fn ok(&self, result: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": self.id, "result": result })
    }

    pub fn err(&self, code: i32, message: &str) -> Value {
        json!({ "jsonrpc": "2.0", "id": self.id, "error": { "code": code, "message": message } })
    }
}

pub enum Reply {
    Send(Vec<Value>),
    After(Duration, Vec<Value>),
    Silent,
    /// Close the connection without answering
    Hangup,
}

type Handler = Arc<dyn Fn(&Incoming) -> Option<Reply> + Send + Sync>;
type SharedWriter = Arc<tokio::sync::Mutex<FrameWriter<DuplexStream>>>;

pub struct FakeLauncher {
    handler: Handler,
    after_initialized: Vec<Value>,
    launch_delay: Duration,
    fail: bool,
    launches: AtomicUsize,
    alive: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Value>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::with_handler(|_| None)
    }

    /// `handler` returning `None` falls back to the default answers
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Incoming) -> Option<Reply> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            after_initialized: Vec::new(),
            launch_delay: Duration::ZERO,
            fail: false,
            launches: AtomicUsize::new(0),
            alive: Arc::new(AtomicUsize::new(0)),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Messages pushed to the client once it sends `initialized`
    pub fn after_initialized(mut self, messages: Vec<Value>) -> Self {
        self.after_initialized = messages;
        self
    }

    pub fn launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Servers whose connection is still open
    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Value> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn received_methods(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|m| m.get("method").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn received_method(&self, method: &str) -> Option<Value> {
        self.received()
            .into_iter()
            .find(|m| m.get("method").and_then(Value::as_str) == Some(method))
    }
}

#[async_trait]
impl ServerLauncher for FakeLauncher {
    async fn launch(
        &self,
        _config: &LanguageServerConfig,
        _workspace_root: &Path,
    ) -> Result<ServerConnection, LspError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        if self.fail {
            return Err(LspError::ServerStart("fake-ls: not found".to_string()));
        }

        let (client_writer, server_reader) = tokio::io::duplex(64 * 1024);
        let (server_writer, client_reader) = tokio::io::duplex(64 * 1024);

        self.alive.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve(
            server_reader,
            server_writer,
            self.handler.clone(),
            self.after_initialized.clone(),
            self.alive.clone(),
            self.received.clone(),
        ));

        Ok(ServerConnection {
            reader: Box::new(client_reader),
            writer: Box::new(client_writer),
            process: None,
        })
    }
}

async fn serve(
    reader: DuplexStream,
    writer: DuplexStream,
    handler: Handler,
    after_initialized: Vec<Value>,
    alive: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Value>>>,
) {
    let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(FrameWriter::new(writer)));
    let mut reader = FrameReader::new(reader);

    while let Ok(Some(body)) = reader.read_frame().await {
        let Ok(msg) = serde_json::from_slice::<Value>(&body) else {
            continue;
        };
        received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(msg.clone());

        let method = msg
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match (msg.get("id").cloned(), method.as_str()) {
            (None, "exit") => break,
            (None, "initialized") => write_all(&writer, &after_initialized).await,
            (Some(id), m) if !m.is_empty() => {
                let request = Incoming {
                    id,
                    method,
                    params: msg.get("params").cloned().unwrap_or(Value::Null),
                };
                let reply = handler(&request).unwrap_or_else(|| default_reply(&request));
                match reply {
                    Reply::Send(messages) => write_all(&writer, &messages).await,
                    Reply::After(delay, messages) => {
                        let writer = writer.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            write_all(&writer, &messages).await;
                        });
                    }
                    Reply::Silent => {}
                    Reply::Hangup => break,
                }
            }
            _ => {}
        }
    }

    alive.fetch_sub(1, Ordering::SeqCst);
}

async fn write_all(writer: &SharedWriter, messages: &[Value]) {
    let mut writer = writer.lock().await;
    for message in messages {
        if writer.write_message(message).await.is_err() {
            return;
        }
    }
}

fn default_reply(request: &Incoming) -> Reply {
    match request.method.as_str() {
        "initialize" => Reply::Send(vec![request.ok(json!({
            "capabilities": {
                "textDocumentSync": 1,
                "hoverProvider": true,
                "completionProvider": { "triggerCharacters": ["."] },
                "signatureHelpProvider": { "triggerCharacters": ["("] },
                "definitionProvider": true,
                "referencesProvider": true,
                "documentSymbolProvider": true,
                "codeActionProvider": true,
                "documentFormattingProvider": true,
                "renameProvider": { "prepareProvider": true }
            },
            "serverInfo": { "name": "fake-ls", "version": "0.1.0" }
        }))]),
        _ => Reply::Send(vec![request.ok(Value::Null)]),
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn basiclang_config() -> LanguageServerConfig {
    LanguageServerConfig::new(
        "basiclang",
        "BasicLang Language Server",
        ServerStartInfo::new("basiclang-ls"),
    )
    .with_languages(["basiclang"])
    .with_extensions([".bas"])
}

pub fn publish_diagnostics(uri: &str, line: u32, severity: u8, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "textDocument/publishDiagnostics",
        "params": {
            "uri": uri,
            "version": 1,
            "diagnostics": [{
                "range": {
                    "start": { "line": line, "character": 0 },
                    "end": { "line": line, "character": 5 }
                },
                "severity": severity,
                "source": "fake-ls",
                "message": message
            }]
        }
    })
}
