//! Embedding engine trait.
//!
//! The `EmbedderBackend` trait abstracts over embedding generation so the
//! retrieval index can be built and queried against any backend, including
//! deterministic fakes in tests.

use async_trait::async_trait;
use folio_core::Result;
use ndarray::Array1;

#[async_trait]
pub trait EmbedderBackend: Send + Sync {
    /// Generate an embedding for a text string.
    async fn embed(&self, text: &str) -> Result<Array1<f32>>;

    /// Generate embeddings for a batch of texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Identifier of the embedding model; persisted alongside the index.
    fn model(&self) -> &str;
}
