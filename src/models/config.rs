//! Configuration model for lsp-hub

use serde::{Deserialize, Serialize};

use super::server::LanguageServerConfig;

/// Settings file contents
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HubConfig {
    #[serde(default)]
    pub lsp: LspSettings,

    /// User-registered servers; an entry with a built-in id replaces it
    #[serde(default)]
    pub servers: Vec<LanguageServerConfig>,
}

/// Client runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspSettings {
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "defaults::shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// How long the CLI waits for a `publishDiagnostics` after opening a file
    #[serde(default = "defaults::diagnostics_wait_ms")]
    pub diagnostics_wait_ms: u64,
}

impl Default for LspSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: defaults::request_timeout_secs(),
            shutdown_timeout_secs: defaults::shutdown_timeout_secs(),
            diagnostics_wait_ms: defaults::diagnostics_wait_ms(),
        }
    }
}

mod defaults {
    pub fn request_timeout_secs() -> u64 {
        30
    }
    pub fn shutdown_timeout_secs() -> u64 {
        5
    }
    pub fn diagnostics_wait_ms() -> u64 {
        3000
    }
}
