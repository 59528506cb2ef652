//! Vector retrieval index over the knowledge passages.
//!
//! Embeddings are L2-normalized at build time and kept as rows of a dense
//! matrix, so a cosine query is a single matrix-vector product. The index is
//! persisted as JSON (`<dir>/index.json`) together with the embedding model
//! and a SHA-256 fingerprint of the passage set; a stale file is rebuilt.

use std::path::{Path, PathBuf};

use chrono::Utc;
use folio_core::{Error, Result};
use folio_infer::EmbedderBackend;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::types::{Passage, SearchHit};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    model: String,
    fingerprint: String,
    created_at: String,
    entries: Vec<PersistedEntry>,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    #[serde(flatten)]
    passage: Passage,
    embedding: Vec<f32>,
}

pub struct RetrievalIndex {
    passages: Vec<Passage>,
    /// One normalized row per passage.
    matrix: Array2<f32>,
    model: String,
    fingerprint: String,
}

impl RetrievalIndex {
    pub const FILE_NAME: &'static str = "index.json";

    /// Content fingerprint of a passage set, order-sensitive.
    pub fn fingerprint(passages: &[Passage]) -> String {
        let mut hasher = Sha256::new();
        for p in passages {
            hasher.update(p.category.as_bytes());
            hasher.update([0u8]);
            hasher.update(p.content.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Embed every passage and build a fresh index.
    pub async fn build(passages: Vec<Passage>, embedder: &dyn EmbedderBackend) -> Result<Self> {
        let texts: Vec<&str> = passages.iter().map(|p| p.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        let fingerprint = Self::fingerprint(&passages);
        Self::from_parts(passages, embeddings, embedder.model().to_string(), fingerprint)
    }

    fn from_parts(
        passages: Vec<Passage>,
        embeddings: Vec<Array1<f32>>,
        model: String,
        fingerprint: String,
    ) -> Result<Self> {
        if passages.is_empty() {
            return Err(Error::Index("Cannot index an empty passage set".into()));
        }
        if embeddings.len() != passages.len() {
            return Err(Error::Index(format!(
                "{} passages but {} embeddings",
                passages.len(),
                embeddings.len()
            )));
        }
        let dim = embeddings[0].len();
        if dim == 0 || embeddings.iter().any(|e| e.len() != dim) {
            return Err(Error::Index("Inconsistent embedding dimensions".into()));
        }

        let mut matrix = Array2::zeros((embeddings.len(), dim));
        for (i, emb) in embeddings.iter().enumerate() {
            matrix.row_mut(i).assign(emb);
        }
        for mut row in matrix.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 1e-9 {
                row /= norm;
            }
        }

        Ok(Self {
            passages,
            matrix,
            model,
            fingerprint,
        })
    }

    /// Write the index to `<dir>/index.json`, creating `dir` if needed.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let persisted = PersistedIndex {
            version: FORMAT_VERSION,
            model: self.model.clone(),
            fingerprint: self.fingerprint.clone(),
            created_at: Utc::now().to_rfc3339(),
            entries: self
                .passages
                .iter()
                .zip(self.matrix.rows())
                .map(|(passage, row)| PersistedEntry {
                    passage: passage.clone(),
                    embedding: row.to_vec(),
                })
                .collect(),
        };

        let path = dir.join(Self::FILE_NAME);
        let tmp = dir.join(format!("{}.tmp", Self::FILE_NAME));
        std::fs::write(&tmp, serde_json::to_vec(&persisted)?)?;
        std::fs::rename(&tmp, &path)?;
        info!("Saved retrieval index ({} passages) to {}", self.len(), path.display());
        Ok(path)
    }

    /// Read an index previously written by [`RetrievalIndex::save`].
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(Self::FILE_NAME);
        let data = std::fs::read(&path)?;
        let persisted: PersistedIndex = serde_json::from_slice(&data)?;
        if persisted.version != FORMAT_VERSION {
            return Err(Error::Index(format!(
                "Unsupported index version {}",
                persisted.version
            )));
        }

        let (passages, embeddings): (Vec<_>, Vec<_>) = persisted
            .entries
            .into_iter()
            .map(|e| (e.passage, Array1::from(e.embedding)))
            .unzip();
        Self::from_parts(passages, embeddings, persisted.model, persisted.fingerprint)
    }

    /// Load the persisted index if it matches `passages` and the embedder's
    /// model; otherwise build a new one and persist it.
    pub async fn load_or_build(
        dir: &Path,
        passages: Vec<Passage>,
        embedder: &dyn EmbedderBackend,
    ) -> Result<Self> {
        let expected = Self::fingerprint(&passages);
        match Self::load(dir) {
            Ok(index) if index.fingerprint == expected && index.model == embedder.model() => {
                info!("Loaded existing retrieval index ({} passages)", index.len());
                return Ok(index);
            }
            Ok(_) => info!("Retrieval index is stale, rebuilding"),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No retrieval index at {}, building", dir.display());
            }
            Err(e) => warn!("Could not load retrieval index: {}. Rebuilding.", e),
        }

        let index = Self::build(passages, embedder).await?;
        index.save(dir)?;
        Ok(index)
    }

    /// Rank passages by cosine similarity to `query_embedding`.
    pub fn search(&self, query_embedding: &Array1<f32>, top_k: usize) -> Vec<SearchHit> {
        if top_k == 0 || query_embedding.len() != self.matrix.ncols() {
            return Vec::new();
        }
        let q_norm = query_embedding.dot(query_embedding).sqrt();
        if q_norm < 1e-9 {
            return Vec::new();
        }
        let q = query_embedding / q_norm;

        // (N, dim) @ (dim,) -> (N,)
        let similarities = self.matrix.dot(&q);

        let mut ranked: Vec<(usize, f32)> = similarities.iter().copied().enumerate().collect();
        // Stable sort: equal scores keep passage order.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(position, score)| SearchHit {
                passage: self.passages[position].clone(),
                score,
                position,
            })
            .collect()
    }

    /// Embed `text` and return the `top_k` closest passages.
    pub async fn query(
        &self,
        embedder: &dyn EmbedderBackend,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let embedding = embedder.embed(text).await?;
        let hits = self.search(&embedding, top_k);
        debug!(
            "Retrieved {:?} for query",
            hits.iter().map(|h| h.passage.category.as_str()).collect::<Vec<_>>()
        );
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
