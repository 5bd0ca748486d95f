//! Error types for lsp-hub
//!
//! These stay internal to the client runtime: the public client and manager
//! surface reports failures as `false`/`None` and logs the error detail.

use thiserror::Error;

use crate::models::server::TransportKind;

pub type HubResult<T> = std::result::Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("{0}")]
    Lsp(#[from] LspError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("No language server is configured for '{0}'")]
    UnsupportedFile(String),

    #[error("Language server '{0}' could not be started")]
    ServerUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LspError {
    #[error("Failed to start server: {0}")]
    ServerStart(String),

    #[error("Transport '{transport}' is not supported for server '{server}' (only stdio)")]
    UnsupportedTransport {
        server: String,
        transport: TransportKind,
    },

    #[error("Server not connected")]
    NotConnected,

    #[error("Connection to the language server is closed")]
    ConnectionClosed,

    #[error("Request '{method}' timed out")]
    Timeout { method: String },

    #[error("Server error [{code}]: {message}")]
    ServerError { code: i32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LspError {
    pub fn error_code(&self) -> i32 {
        match self {
            Self::ServerError { code, .. } => *code,
            Self::Timeout { .. } => -32001,
            Self::NotConnected | Self::ConnectionClosed => -32003,
            _ => -32000,
        }
    }

    /// The server process went away; further requests on this client are futile
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectionClosed)
            || matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }
}

impl From<crate::infra::lsp::protocol::ResponseError> for LspError {
    fn from(err: crate::infra::lsp::protocol::ResponseError) -> Self {
        Self::ServerError {
            code: err.code,
            message: err.message,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LspError::ServerError {
                code: -32601,
                message: "Method not found".to_string()
            }
            .error_code(),
            -32601
        );
        assert_eq!(
            LspError::Timeout {
                method: "textDocument/hover".to_string()
            }
            .error_code(),
            -32001
        );
        assert_eq!(LspError::NotConnected.error_code(), -32003);
    }

    #[test]
    fn test_disconnect_detection() {
        assert!(LspError::ConnectionClosed.is_disconnect());
        assert!(
            LspError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe")).is_disconnect()
        );
        assert!(!LspError::Protocol("bad".to_string()).is_disconnect());
    }

    #[test]
    fn test_unsupported_transport_message() {
        let err = LspError::UnsupportedTransport {
            server: "omnisharp".to_string(),
            transport: TransportKind::Tcp,
        };
        assert!(err.to_string().contains("tcp"));
        assert!(err.to_string().contains("omnisharp"));
    }

    #[test]
    fn test_response_error_conversion() {
        let err: LspError = crate::infra::lsp::protocol::ResponseError {
            code: -32602,
            message: "Invalid params".to_string(),
            data: None,
        }
        .into();
        assert!(matches!(err, LspError::ServerError { code: -32602, .. }));
    }
}
