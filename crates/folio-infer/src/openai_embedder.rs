//! OpenAI embeddings API backend.
//!
//! Posts to `{base_url}/embeddings` and returns one float32 vector per
//! input. Single-text calls go through a `QueryCache` since they come from
//! chat messages; batch calls (index builds) do not.

use async_trait::async_trait;
use folio_core::{Error, Result};
use ndarray::Array1;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::cache::QueryCache;
use crate::embedder::EmbedderBackend;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    cache: QueryCache,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            cache: QueryCache::default_cache(),
        }
    }

    /// Point at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Array1<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        debug!("Embedding {} text(s) with {}", inputs.len(), self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": inputs }))
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = Error::from_api_response(status.as_u16(), &body);
            return Err(Error::Embedding(err.to_string()));
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Malformed embeddings response: {}", e)))?;

        if parsed.data.len() != inputs.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|row| row.index);
        Ok(parsed
            .data
            .into_iter()
            .map(|row| Array1::from(row.embedding))
            .collect())
    }
}

#[async_trait]
impl EmbedderBackend for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Array1<f32>> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let embedding = self
            .request(&[text])
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding("Empty embeddings response".into()))?;
        self.cache.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    /// Upstream double: embeds each input as `[len, index]`, listed in reverse order.
    async fn spawn_upstream(calls: Arc<AtomicUsize>, fail: bool) -> String {
        async fn handler(
            State((calls, fail)): State<(Arc<AtomicUsize>, bool)>,
            Json(body): Json<serde_json::Value>,
        ) -> (StatusCode, Json<serde_json::Value>) {
            calls.fetch_add(1, Ordering::SeqCst);
            if fail {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}})),
                );
            }
            let inputs = body["input"].as_array().cloned().unwrap_or_default();
            let mut data: Vec<serde_json::Value> = inputs
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let len = text.as_str().unwrap_or("").len() as f32;
                    json!({"index": i, "embedding": [len, i as f32]})
                })
                .collect();
            data.reverse();
            (StatusCode::OK, Json(json!({ "data": data })))
        }

        let app = Router::new()
            .route("/embeddings", post(handler))
            .with_state((calls, fail));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_batch_restores_input_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = spawn_upstream(calls.clone(), false).await;
        let embedder = OpenAiEmbedder::new("sk-test").with_base_url(base);

        let out = embedder.embed_batch(&["a", "bbb", "cc"]).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0][0], 1.0);
        assert_eq!(out[1][0], 3.0);
        assert_eq!(out[2][0], 2.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_embeddings_are_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = spawn_upstream(calls.clone(), false).await;
        let embedder = OpenAiEmbedder::new("sk-test").with_base_url(base);

        let first = embedder.embed("What is KYARA?").await.unwrap();
        let second = embedder.embed("What is KYARA?").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_api_error_is_embedding_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = spawn_upstream(calls, true).await;
        let embedder = OpenAiEmbedder::new("sk-bad").with_base_url(base);

        let err = embedder.embed("hello").await.unwrap_err();
        match err {
            Error::Embedding(msg) => assert!(msg.contains("Incorrect API key")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
