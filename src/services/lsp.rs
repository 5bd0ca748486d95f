//! File-level LSP operations
//!
//! Resolves a file to its language server through the manager, keeps the
//! server's view of the document in sync, and runs one operation against it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::config::RuntimeConfig;
use crate::error::HubError;
use crate::infra::lsp::{LspClient, LspClientManager, servers};
use crate::models::config::HubConfig;
use crate::models::diagnostic::FileDiagnostics;
use crate::models::lsp::{
    CompletionList, DocumentSymbol, Hover, Location, Position, TextEdit, path_to_uri,
};

/// A configured server as listed by `lsp-hub servers`
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub id: String,
    pub name: String,
    pub languages: Vec<String>,
    pub extensions: Vec<String>,
    pub command: String,
    pub enabled: bool,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_hint: Option<&'static str>,
}

#[async_trait]
pub trait LspService: Send + Sync {
    fn servers(&self) -> Vec<ServerStatus>;
    async fn diagnostics(&self, file: &Path) -> Result<FileDiagnostics, HubError>;
    async fn hover(&self, file: &Path, position: Position) -> Result<Option<Hover>, HubError>;
    async fn definition(&self, file: &Path, position: Position) -> Result<Vec<Location>, HubError>;
    async fn references(
        &self,
        file: &Path,
        position: Position,
        include_declaration: bool,
    ) -> Result<Vec<Location>, HubError>;
    async fn completion(&self, file: &Path, position: Position)
    -> Result<CompletionList, HubError>;
    async fn document_symbols(&self, file: &Path) -> Result<Vec<DocumentSymbol>, HubError>;
    async fn formatting(
        &self,
        file: &Path,
        tab_size: u32,
        insert_spaces: bool,
    ) -> Result<Vec<TextEdit>, HubError>;
    /// Gracefully stop every server this service started
    async fn shutdown(&self);
}

pub struct DefaultLspService {
    root: PathBuf,
    manager: LspClientManager,
    diagnostics_wait: Duration,
    /// Last version sent per URI and the client session it went to
    versions: Mutex<HashMap<String, (Weak<LspClient>, i32)>>,
}

impl DefaultLspService {
    pub fn new(root: &Path, config: &HubConfig) -> Result<Self, HubError> {
        let runtime = RuntimeConfig::from(config);
        let manager = LspClientManager::new().with_options(runtime.client);
        Self::with_manager(root, manager, config, runtime.diagnostics_wait)
    }

    /// Register the user's servers on `manager` and wrap it
    pub fn with_manager(
        root: &Path,
        manager: LspClientManager,
        config: &HubConfig,
        diagnostics_wait: Duration,
    ) -> Result<Self, HubError> {
        for server in &config.servers {
            manager.register_server(server.clone())?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            manager,
            diagnostics_wait,
            versions: Mutex::new(HashMap::new()),
        })
    }

    pub fn manager(&self) -> &LspClientManager {
        &self.manager
    }

    async fn client_for(&self, file: &Path) -> Result<Arc<LspClient>, HubError> {
        let ext = file
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| HubError::UnsupportedFile(file.display().to_string()))?;
        let language = self
            .manager
            .language_for_extension(ext)
            .ok_or_else(|| HubError::UnsupportedFile(format!(".{}", ext)))?;

        self.manager
            .get_client(&language, &self.root)
            .await
            .ok_or(HubError::ServerUnavailable(language))
    }

    /// Send the file's current text, opening it on first use
    ///
    /// A replacement client has never seen the document, so it starts over
    /// at version 1 with `didOpen`.
    async fn sync_document(
        &self,
        client: &Arc<LspClient>,
        file: &Path,
    ) -> Result<String, HubError> {
        let text = tokio::fs::read_to_string(file).await?;
        let uri = path_to_uri(file);

        let version = {
            let mut versions = crate::infra::lock(&self.versions);
            let session = Arc::downgrade(client);
            let entry = versions
                .entry(uri.clone())
                .or_insert_with(|| (Weak::new(), 0));
            if !Weak::ptr_eq(&entry.0, &session) {
                *entry = (session, 0);
            }
            entry.1 += 1;
            entry.1
        };

        if version == 1 {
            client.did_open(&uri, client.language_id(), version, &text);
        } else {
            client.did_change(&uri, version, &text);
        }
        Ok(uri)
    }

    async fn prepare(&self, file: &Path) -> Result<(Arc<LspClient>, String), HubError> {
        let client = self.client_for(file).await?;
        let uri = self.sync_document(&client, file).await?;
        Ok((client, uri))
    }
}

#[async_trait]
impl LspService for DefaultLspService {
    fn servers(&self) -> Vec<ServerStatus> {
        self.manager
            .configs()
            .into_iter()
            .map(|config| ServerStatus {
                installed: config.start.is_installed(),
                install_hint: servers::install_hint(&config.id),
                name: config.display_name().to_string(),
                languages: config.language_ids.clone(),
                extensions: config.file_extensions.iter().cloned().collect(),
                command: config.start.command.clone(),
                enabled: config.enabled,
                id: config.id,
            })
            .collect()
    }

    async fn diagnostics(&self, file: &Path) -> Result<FileDiagnostics, HubError> {
        // Subscribe first: servers may publish as soon as they start
        let mut events = self.manager.subscribe_diagnostics();
        let (client, uri) = self.prepare(file).await?;

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(published) if published.uri == uri => return Some(published),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Missed {} diagnostics events", skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        };

        let outcome = tokio::time::timeout(self.diagnostics_wait, wait).await;
        match outcome {
            Ok(Some(published)) => Ok(published),
            _ => {
                tracing::debug!("No diagnostics for {} within {:?}", uri, self.diagnostics_wait);
                Ok(FileDiagnostics {
                    file_path: file.to_path_buf(),
                    language_id: client.language_id().to_string(),
                    uri,
                    version: None,
                    diagnostics: Vec::new(),
                })
            }
        }
    }

    async fn hover(&self, file: &Path, position: Position) -> Result<Option<Hover>, HubError> {
        let (client, uri) = self.prepare(file).await?;
        Ok(client.hover(&uri, position).await)
    }

    async fn definition(&self, file: &Path, position: Position) -> Result<Vec<Location>, HubError> {
        let (client, uri) = self.prepare(file).await?;
        Ok(client.definition(&uri, position).await.unwrap_or_default())
    }

    async fn references(
        &self,
        file: &Path,
        position: Position,
        include_declaration: bool,
    ) -> Result<Vec<Location>, HubError> {
        let (client, uri) = self.prepare(file).await?;
        Ok(client
            .references(&uri, position, include_declaration)
            .await
            .unwrap_or_default())
    }

    async fn completion(
        &self,
        file: &Path,
        position: Position,
    ) -> Result<CompletionList, HubError> {
        let (client, uri) = self.prepare(file).await?;
        Ok(client.completion(&uri, position).await.unwrap_or_default())
    }

    async fn document_symbols(&self, file: &Path) -> Result<Vec<DocumentSymbol>, HubError> {
        let (client, uri) = self.prepare(file).await?;
        Ok(client.document_symbols(&uri).await.unwrap_or_default())
    }

    async fn formatting(
        &self,
        file: &Path,
        tab_size: u32,
        insert_spaces: bool,
    ) -> Result<Vec<TextEdit>, HubError> {
        let (client, uri) = self.prepare(file).await?;
        Ok(client
            .formatting(&uri, tab_size, insert_spaces)
            .await
            .unwrap_or_default())
    }

    async fn shutdown(&self) {
        self.manager.stop_all().await;
    }
}
