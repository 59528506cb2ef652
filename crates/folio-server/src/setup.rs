//! `folio setup-vectors`: build and persist the retrieval index offline.

use std::path::{Path, PathBuf};

use folio_core::{DataPaths, Error, ProviderKeys, Result};
use folio_infer::{EmbedderBackend, OpenAiEmbedder};
use folio_store::{load_knowledge_base, RetrievalIndex};
use tracing::info;

/// Embed every knowledge passage and write `<data-dir>/vectors/index.json`.
///
/// Always rebuilds, replacing any existing index.
pub async fn setup_vectors(data_dir: &Path, keys: &ProviderKeys) -> Result<PathBuf> {
    let api_key = keys.openai_api_key.as_deref().ok_or_else(|| {
        Error::Config(
            "OPENAI_API_KEY is required to build the retrieval index. \
             Set it in the environment or in .env and run `folio setup-vectors` again"
                .into(),
        )
    })?;
    let embedder = OpenAiEmbedder::new(api_key);
    build_index(data_dir, &embedder).await
}

/// Build with an explicit embedder.
pub async fn build_index(data_dir: &Path, embedder: &dyn EmbedderBackend) -> Result<PathBuf> {
    let paths = DataPaths::new(data_dir);
    let passages = load_knowledge_base();
    info!(
        "Embedding {} passages with {}",
        passages.len(),
        embedder.model()
    );

    let index = RetrievalIndex::build(passages, embedder).await?;
    index.save(&paths.vectors)
}
