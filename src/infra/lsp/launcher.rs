//! Language server process launching

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::error::LspError;
use crate::models::server::{LanguageServerConfig, TransportKind};

/// Byte streams to a running server plus the process that owns them
pub struct ServerConnection {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// `None` for in-process servers
    pub process: Option<Child>,
}

/// Starts a language server for a configuration
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(
        &self,
        config: &LanguageServerConfig,
        workspace_root: &Path,
    ) -> Result<ServerConnection, LspError>;
}

/// Spawns the configured command and talks to it over stdio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

#[async_trait]
impl ServerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        config: &LanguageServerConfig,
        workspace_root: &Path,
    ) -> Result<ServerConnection, LspError> {
        let start = &config.start;
        if start.transport != TransportKind::Stdio {
            return Err(LspError::UnsupportedTransport {
                server: config.id.clone(),
                transport: start.transport,
            });
        }

        let cwd = start.cwd.as_deref().unwrap_or(workspace_root);

        tracing::info!(
            "Starting {} language server: {} {:?}",
            config.id,
            start.command,
            start.args
        );

        let mut child = Command::new(&start.command)
            .args(&start.args)
            .envs(&start.env)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspError::ServerStart(format!("{}: {}", start.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::ServerStart("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::ServerStart("Failed to get stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(config.id.clone(), stderr));
        }

        Ok(ServerConnection {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            process: Some(child),
        })
    }
}

async fn drain_stderr(server_id: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!("{} stderr: {}", server_id, line);
    }
}
