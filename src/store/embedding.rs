//! Embedding models for the result store.
//!
//! Every stored record carries a 384-dimension embedding of its outcome
//! summary. [`HttpEmbedder`] talks to an embeddings endpoint;
//! [`HashEmbedder`] is the deterministic local model used when no
//! endpoint is configured, and in tests.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rustc_hash::FxHasher;
use serde::Deserialize;

use super::StoreError;

/// Dimension of every embedding in the store.
pub const EMBEDDING_DIM: usize = 384;

/// Turns an outcome summary into a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StoreError::Embedding`] when the model cannot produce a
    /// vector of [`EMBEDDING_DIM`] dimensions.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

// ── Remote model ────────────────────────────────────────────────────────

/// Calls an Ollama-compatible embeddings endpoint.
pub struct HttpEmbedder {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// # Errors
    ///
    /// Returns the underlying `reqwest` error when the HTTP client cannot
    /// be constructed.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: std::time::Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| StoreError::Embedding(err.to_string()))?;

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| StoreError::Embedding(err.to_string()))?;

        if body.embedding.len() != EMBEDDING_DIM {
            return Err(StoreError::Embedding(format!(
                "model returned {} dimensions, expected {EMBEDDING_DIM}",
                body.embedding.len()
            )));
        }
        Ok(body.embedding)
    }
}

// ── Local model ─────────────────────────────────────────────────────────

/// Deterministic token-hashing embedder.
///
/// Each whitespace token is hashed into one of the 384 buckets; the
/// resulting vector is L2-normalized. No semantic power, but identical
/// text always maps to an identical vector, which is all similarity
/// search over outcome summaries needs in development and tests.
#[derive(Debug, Default, Clone)]
pub struct HashEmbedder;

impl HashEmbedder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        for token in text.split_whitespace() {
            let mut hasher = FxHasher::default();
            token.to_lowercase().hash(&mut hasher);
            let hashed = hasher.finish();
            let bucket = (hashed % EMBEDDING_DIM as u64) as usize;
            // Sign bit from a higher hash bit keeps buckets from only
            // accumulating positives.
            let sign = if hashed & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("provider 42 grade A approved").await.unwrap();
        let b = embedder.embed("provider 42 grade A approved").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn similar_text_scores_higher_than_unrelated() {
        let embedder = HashEmbedder::new();
        let base = embedder.embed("provider 42 grade A approved").await.unwrap();
        let near = embedder.embed("provider 42 grade B approved").await.unwrap();
        let far = embedder.embed("totally unrelated words here").await.unwrap();

        let dot = |x: &[f32], y: &[f32]| -> f32 { x.iter().zip(y).map(|(a, b)| a * b).sum() };
        assert!(dot(&base, &near) > dot(&base, &far));
    }

    #[tokio::test]
    async fn http_embedder_rejects_wrong_dimension() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST);
            then.status(200)
                .json_body(serde_json::json!({ "embedding": [0.1, 0.2] }));
        });

        let embedder = HttpEmbedder::new(
            server.url("/api/embeddings"),
            "all-minilm",
            std::time::Duration::from_secs(2),
        )
        .unwrap();
        let err = embedder.embed("text").await.unwrap_err();
        assert!(matches!(err, StoreError::Embedding(_)));
    }
}
