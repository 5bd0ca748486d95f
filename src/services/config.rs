//! Configuration service for lsp-hub
//!
//! Settings come from up to two TOML files, the global one under the user's
//! config directory and a project one under `<root>/.lsp-hub/`. Project values
//! win; `[[servers]]` entries are merged by `id`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use toml::{Table, Value};

use crate::error::ConfigError;
use crate::models::config::HubConfig;

pub const TIMEOUT_ENV: &str = "LSP_HUB_TIMEOUT_SECS";

#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Global and project settings merged, with environment overrides applied
    async fn load(&self) -> Result<HubConfig, ConfigError>;
    fn config_path(&self, global: bool) -> PathBuf;
}

pub struct DefaultConfigService {
    global_path: PathBuf,
    project_path: Option<PathBuf>,
}

impl DefaultConfigService {
    pub fn new(root: &Path) -> Self {
        Self {
            global_path: Self::global_config_path(),
            project_path: Some(root.join(".lsp-hub").join("config.toml")),
        }
    }

    /// Read a single explicit file instead of the global/project pair
    pub fn from_file(path: &Path) -> Self {
        Self {
            global_path: path.to_path_buf(),
            project_path: None,
        }
    }

    fn global_config_path() -> PathBuf {
        // XDG standard: ~/.config/lsp-hub/config.toml
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lsp-hub")
            .join("config.toml")
    }

    async fn load_table(path: &Path) -> Result<Table, ConfigError> {
        if !path.exists() {
            return Ok(Table::new());
        }
        tracing::debug!("Loading settings from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        toml::from_str::<Table>(&content)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    async fn load_merged(&self) -> Result<HubConfig, ConfigError> {
        let mut table = Self::load_table(&self.global_path).await?;
        if let Some(project) = &self.project_path {
            merge_tables(&mut table, Self::load_table(project).await?);
        }

        let config: HubConfig = Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        for server in &config.servers {
            server.validate()?;
        }
        Ok(config)
    }
}

#[async_trait]
impl ConfigService for DefaultConfigService {
    async fn load(&self) -> Result<HubConfig, ConfigError> {
        let config = self.load_merged().await?;
        apply_env_overrides(config, std::env::var(TIMEOUT_ENV).ok().as_deref())
    }

    fn config_path(&self, global: bool) -> PathBuf {
        match (&self.project_path, global) {
            (Some(project), false) => project.clone(),
            _ => self.global_path.clone(),
        }
    }
}

/// Overlay `overlay` onto `base`: tables merge key by key, `servers` arrays
/// merge by `id`, anything else is replaced
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let value = match (base.get_mut(&key), value) {
            (Some(Value::Array(existing)), Value::Array(servers)) if key == "servers" => {
                merge_servers(existing, servers);
                continue;
            }
            (Some(Value::Table(existing)), Value::Table(table)) => {
                merge_tables(existing, table);
                continue;
            }
            (_, value) => value,
        };
        base.insert(key, value);
    }
}

fn merge_servers(base: &mut Vec<Value>, overlay: Vec<Value>) {
    fn id_of(server: &Value) -> Option<&str> {
        server.get("id").and_then(Value::as_str)
    }

    for server in overlay {
        let existing = id_of(&server)
            .and_then(|id| base.iter().position(|s| id_of(s) == Some(id)));
        match existing {
            Some(index) => base[index] = server,
            None => base.push(server),
        }
    }
}

fn apply_env_overrides(
    mut config: HubConfig,
    timeout: Option<&str>,
) -> Result<HubConfig, ConfigError> {
    if let Some(val) = timeout {
        config.lsp.request_timeout_secs =
            val.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: TIMEOUT_ENV.to_string(),
                    message: format!("expected a number of seconds, got '{}'", val),
                })?;
    }
    Ok(config)
}
