//! Embedding-indexed persistence of validation outcomes.
//!
//! Every completed run appends exactly one [`StoredRecord`]. Records are
//! never updated in place; re-validating a provider adds a new row, and
//! point lookups resolve to the most recent one.

mod embedding;
mod sqlite;

pub use embedding::{Embedder, HashEmbedder, HttpEmbedder, EMBEDDING_DIM};
pub use sqlite::SqliteResultStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::RunState;

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database rejected the operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The embedding model failed or returned a bad vector.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A record's fields violated the schema constraints.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// A record ready for insertion.
#[derive(Clone, Debug)]
pub struct NewRecord {
    pub provider_id: i64,
    /// ≤10 characters.
    pub npi: String,
    /// Exactly [`EMBEDDING_DIM`] dimensions.
    pub embedding: Vec<f32>,
    pub trust_score: f64,
    /// ≤50 characters, e.g. `done` or `failed`.
    pub validation_stage: String,
}

/// A persisted validation outcome.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub provider_id: i64,
    pub npi: String,
    pub embedding: Vec<f32>,
    pub trust_score: f64,
    pub validation_stage: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only outcome store with similarity search.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append a record and return it with its assigned id.
    async fn insert(&self, record: NewRecord) -> Result<StoredRecord, StoreError>;

    /// Nearest records by cosine similarity, best first.
    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(StoredRecord, f32)>, StoreError>;

    /// The most recently inserted record for a provider.
    async fn find_by_provider(&self, provider_id: i64) -> Result<Option<StoredRecord>, StoreError>;

    /// All records for a provider, newest first.
    async fn history(&self, provider_id: i64) -> Result<Vec<StoredRecord>, StoreError>;

    /// Total number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;
}

/// Free-text similarity search over stored outcomes.
///
/// Pairs a [`ResultStore`] with the [`Embedder`] that produced its
/// vectors, so callers query by text instead of wiring the embedding
/// step themselves. Obtained from
/// [`Engine::outcome_search`](crate::pipeline::Engine::outcome_search)
/// or built directly around any store/embedder pair.
#[derive(Clone)]
pub struct SimilaritySearch {
    store: Arc<dyn ResultStore>,
    embedder: Arc<dyn Embedder>,
}

impl SimilaritySearch {
    #[must_use]
    pub fn new(store: Arc<dyn ResultStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Embed `query` and return the nearest stored records, best first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Embedding`] when the query cannot be
    /// embedded, or [`StoreError::Storage`] when the search itself
    /// fails.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(StoredRecord, f32)>, StoreError> {
        let embedding = self.embedder.embed(query).await?;
        self.store.search_similar(&embedding, top_k).await
    }
}

/// Textual summary of a run outcome, used as the embedding input.
#[must_use]
pub fn outcome_summary(state: &RunState) -> String {
    let mut parts = vec![format!(
        "provider {} npi {} specialty {} state {}",
        state.request.provider_id, state.request.npi, state.request.specialty, state.request.state
    )];

    if let Some(validation) = &state.validation {
        parts.push(format!(
            "valid {} conflicts {}",
            validation.overall_valid,
            validation.conflicts.join(" ")
        ));
    }
    if let Some(trust) = &state.trust {
        parts.push(format!(
            "score {} grade {} recommendation {:?}",
            trust.score, trust.grade, trust.recommendation
        ));
    }
    if !state.errors.is_empty() {
        parts.push(format!("errors {}", state.errors.len()));
    }

    parts.join(" ")
}

pub(crate) fn validate_record(record: &NewRecord) -> Result<(), StoreError> {
    if record.npi.len() > 10 {
        return Err(StoreError::InvalidRecord(format!(
            "npi '{}' longer than 10 characters",
            record.npi
        )));
    }
    if record.validation_stage.len() > 50 {
        return Err(StoreError::InvalidRecord(
            "validation_stage longer than 50 characters".to_string(),
        ));
    }
    if record.embedding.len() != EMBEDDING_DIM {
        return Err(StoreError::InvalidRecord(format!(
            "embedding has {} dimensions, expected {EMBEDDING_DIM}",
            record.embedding.len()
        )));
    }
    Ok(())
}
