//! Application container for lsp-hub

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::OutputContext;
use crate::models::config::HubConfig;
use crate::services::config::{ConfigService, DefaultConfigService};
use crate::services::lsp::{DefaultLspService, LspService};

pub struct App {
    root: PathBuf,
    pub(crate) output: OutputContext,
    pub(crate) lsp: Arc<dyn LspService>,
    pub(crate) config: HubConfig,
}

impl App {
    /// Load settings (an explicit file, or global + project) and build services
    pub async fn new(config_file: Option<&Path>) -> anyhow::Result<Self> {
        let root = std::env::current_dir()?;
        tracing::debug!("Initializing lsp-hub at {:?}", root);

        let config_service = match config_file {
            Some(path) => DefaultConfigService::from_file(path),
            None => DefaultConfigService::new(&root),
        };
        let config = config_service.load().await?;
        let lsp = Arc::new(DefaultLspService::new(&root, &config)?);

        tracing::debug!(
            "lsp-hub initialized ({} user servers, settings: {})",
            config.servers.len(),
            config_service.config_path(config_file.is_some()).display()
        );

        Ok(Self {
            output: OutputContext::new(root.clone()),
            root,
            lsp,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Stop every language server started by this run
    pub async fn shutdown(&self) {
        self.lsp.shutdown().await;
    }
}
