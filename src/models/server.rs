//! Language server configuration records

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// How the client talks to the server process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Tcp,
    Pipe,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Tcp => write!(f, "tcp"),
            Self::Pipe => write!(f, "pipe"),
        }
    }
}

/// Process launch parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStartInfo {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Defaults to the workspace root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub transport: TransportKind,
}

impl ServerStartInfo {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            transport: TransportKind::Stdio,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the command resolves on PATH (or is an existing file)
    pub fn is_installed(&self) -> bool {
        which::which(&self.command).is_ok()
    }
}

/// A named language server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageServerConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Declaration order matters: the first id is the primary language
    pub language_ids: Vec<String>,
    #[serde(default)]
    pub file_extensions: BTreeSet<String>,
    #[serde(flatten)]
    pub start: ServerStartInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl LanguageServerConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, start: ServerStartInfo) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            language_ids: Vec::new(),
            file_extensions: BTreeSet::new(),
            start,
            initialization_options: None,
            enabled: true,
        }
    }

    pub fn with_languages<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            let id = id.into();
            if !self.language_ids.contains(&id) {
                self.language_ids.push(id);
            }
        }
        self
    }

    pub fn with_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.file_extensions
            .extend(exts.into_iter().map(|e| normalize_extension(e.as_ref())));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_initialization_options(mut self, options: Value) -> Self {
        self.initialization_options = Some(options);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Language ids are matched case-sensitively
    pub fn handles_language(&self, language_id: &str) -> bool {
        self.language_ids.iter().any(|l| l == language_id)
    }

    /// Extensions are matched case-insensitively, with or without the leading dot
    pub fn handles_extension(&self, ext: &str) -> bool {
        let ext = normalize_extension(ext);
        self.file_extensions
            .iter()
            .any(|e| normalize_extension(e) == ext)
    }

    /// The language id reported for files this server handles
    pub fn primary_language(&self) -> Option<&str> {
        self.language_ids.first().map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "id".to_string(),
                message: "server id must not be empty".to_string(),
            });
        }
        if self.language_ids.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.language_ids", self.id),
                message: "at least one language id is required".to_string(),
            });
        }
        if self.start.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.command", self.id),
                message: "command must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Lowercase and ensure a single leading dot
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_lowercase())
}
