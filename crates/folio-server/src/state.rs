//! Shared application state.

use std::sync::Arc;

use folio_chat::ChatService;
use folio_core::{FolioConfig, Result};
use tokio::sync::OnceCell;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: FolioConfig,
    chat: OnceCell<Arc<ChatService>>,
}

impl AppState {
    pub fn new(config: FolioConfig) -> Self {
        Self {
            config,
            chat: OnceCell::new(),
        }
    }

    /// State with a ready chat service, skipping credential resolution.
    pub fn with_chat_service(config: FolioConfig, service: ChatService) -> Self {
        Self {
            config,
            chat: OnceCell::new_with(Some(Arc::new(service))),
        }
    }

    /// The chat service, initialized on first use.
    ///
    /// Concurrent first callers share one initialization. A failed attempt
    /// leaves the cell empty so the next request tries again.
    pub async fn chat_service(&self) -> Result<Arc<ChatService>> {
        self.chat
            .get_or_try_init(|| async { ChatService::from_config(&self.config).map(Arc::new) })
            .await
            .cloned()
    }
}
