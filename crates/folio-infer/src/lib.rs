//! Folio Infer: embedding backends and query cache.
//!
//! Provides the `EmbedderBackend` trait for generating embeddings.
//! The only production backend is `OpenAiEmbedder`, available when
//! `OPENAI_API_KEY` is configured. Without it there is no embedder at
//! all and retrieval is skipped in favor of the full knowledge base.

pub mod cache;
pub mod embedder;
pub mod openai_embedder;

pub use cache::QueryCache;
pub use embedder::EmbedderBackend;
pub use openai_embedder::OpenAiEmbedder;

use std::sync::Arc;

use folio_core::ProviderKeys;

/// Create the embedder for the configured credentials, if any.
pub fn create_embedder(keys: &ProviderKeys) -> Option<Arc<dyn EmbedderBackend>> {
    match &keys.openai_api_key {
        Some(key) => {
            let embedder = OpenAiEmbedder::new(key.clone());
            tracing::info!("Using OpenAI embeddings (model={})", embedder.model());
            Some(Arc::new(embedder))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set. Retrieval disabled; using full knowledge base.");
            None
        }
    }
}
