//! Error types for Folio.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{message}")]
    Provider {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Provider error without an HTTP status (malformed payloads, in-stream errors).
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Decode a non-success API response.
    ///
    /// OpenAI-compatible services answer with `{"error": {"message", "code"}}`;
    /// anything else is kept verbatim as the message.
    pub fn from_api_response(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let detail = parsed.as_ref().map(|v| &v["error"]);

        let message = detail
            .and_then(|e| e["message"].as_str().or_else(|| e.as_str()))
            .map(|m| m.to_string())
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("API returned status {}", status)
                } else {
                    format!("API error {}: {}", status, trimmed)
                }
            });
        let code = detail
            .and_then(|e| e["code"].as_str())
            .map(|c| c.to_string());

        Self::Provider {
            status: Some(status),
            code,
            message,
        }
    }

    /// True when the provider rejected the request because the model was retired.
    pub fn is_model_decommissioned(&self) -> bool {
        match self {
            Self::Provider { code, message, .. } => {
                code.as_deref() == Some("model_decommissioned")
                    || message.contains("decommissioned")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
