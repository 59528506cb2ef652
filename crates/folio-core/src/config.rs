//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default HTTP port when `PORT` is unset or unparsable.
pub const DEFAULT_PORT: u16 = 3001;

/// Origins the portfolio frontend is served from.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://manish-port-folio.vercel.app",
    "https://manish-port-folio-ck1vj2t34-manishukirades-projects.vercel.app",
    "http://localhost:3000",
    "http://localhost:5173",
];

/// Paths to Folio data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Persisted retrieval index directory (`data/vectors/`).
    pub vectors: PathBuf,
}

impl DataPaths {
    /// Derive data paths from a root directory. Nothing is created on disk.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            vectors: root.join("vectors"),
            root,
        }
    }
}

/// Chat provider credentials, one per supported backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderKeys {
    pub grok_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub mistral_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl ProviderKeys {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let key = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            grok_api_key: key("GROK_API_KEY"),
            groq_api_key: key("GROQ_API_KEY"),
            mistral_api_key: key("MISTRAL_API_KEY"),
            openai_api_key: key("OPENAI_API_KEY"),
        }
    }

    pub fn any(&self) -> bool {
        self.grok_api_key.is_some()
            || self.groq_api_key.is_some()
            || self.mistral_api_key.is_some()
            || self.openai_api_key.is_some()
    }
}

/// Top-level Folio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioConfig {
    /// HTTP server port.
    pub port: u16,
    /// Origins allowed to make cross-origin requests.
    pub allowed_origins: Vec<String>,
    /// Credentials for the chat providers.
    pub keys: ProviderKeys,
    /// Overrides the primary model of whichever provider is selected.
    pub chat_model: Option<String>,
    /// Data directory paths.
    pub data_paths: DataPaths,
}

impl FolioConfig {
    /// Create configuration from the process environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Self {
        Self::from_lookup(data_dir, |name| std::env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup(
        data_dir: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let port = lookup("PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let mut allowed_origins: Vec<String> =
            DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect();
        let extra = lookup("FRONTEND_URL")
            .into_iter()
            .chain(lookup("ALLOWED_ORIGINS"))
            .flat_map(|v| {
                v.split(',')
                    .map(|s| s.trim().trim_end_matches('/').to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|s| !s.is_empty());
        for origin in extra {
            if !allowed_origins.contains(&origin) {
                allowed_origins.push(origin);
            }
        }

        let chat_model = lookup("CHAT_MODEL").filter(|m| !m.trim().is_empty());

        Self {
            port,
            allowed_origins,
            keys: ProviderKeys::from_lookup(&lookup),
            chat_model,
            data_paths: DataPaths::new(data_dir),
        }
    }

    /// Whether a browser origin may call the API.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}
