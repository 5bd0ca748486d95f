//! Runtime settings derived from the settings file

use std::time::Duration;

use crate::infra::lsp::ClientOptions;
use crate::models::config::{HubConfig, LspSettings};

#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub client: ClientOptions,
    /// How long the CLI waits for diagnostics after opening a document
    pub diagnostics_wait: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from(&LspSettings::default())
    }
}

impl From<&LspSettings> for RuntimeConfig {
    fn from(settings: &LspSettings) -> Self {
        Self {
            client: ClientOptions {
                // Zero would fail every request immediately
                request_timeout: Duration::from_secs(settings.request_timeout_secs.max(1)),
                shutdown_timeout: Duration::from_secs(settings.shutdown_timeout_secs),
                ..ClientOptions::default()
            },
            diagnostics_wait: Duration::from_millis(settings.diagnostics_wait_ms),
        }
    }
}

impl From<&HubConfig> for RuntimeConfig {
    fn from(config: &HubConfig) -> Self {
        Self::from(&config.lsp)
    }
}
