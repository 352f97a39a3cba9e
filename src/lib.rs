//! # credvet: Provider-Record Validation Pipeline
//!
//! `credvet` validates healthcare-provider records by pulling data from
//! multiple independent sources, cross-checking the results, back-filling
//! gaps, and producing a single trust score used for an automated
//! approve/review/reject decision.
//!
//! ## Pipeline
//!
//! Every accepted job runs the same four stages in strict order:
//!
//! ```text
//! INGESTION → VALIDATION → ENRICHMENT → SCORING → DONE
//! ```
//!
//! - **Ingestion** ([`sources`]): queries the NPI registry, the state
//!   licensing board, and a business directory. Partial failure is
//!   tolerated — a source outage becomes a `found: false` record and the
//!   run continues.
//! - **Validation** ([`validate`]): cross-checks name, license, and contact
//!   fields across sources, recording conflicts by field group.
//! - **Enrichment** ([`enrich`]): back-fills unresolved contact fields from
//!   secondary sources, tagging provenance and confidence.
//! - **Scoring** ([`score`]): combines static source reliability and field
//!   confidence into a weighted trust score, grade, and recommendation.
//!
//! The [`pipeline`] module drives the stages over a shared [`state::RunState`],
//! reports best-effort progress to an external system of record
//! ([`notify`]), and persists an embedding-indexed record of the outcome
//! ([`store`]) supporting similarity search and point lookup.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use credvet::config::EngineConfig;
//! use credvet::pipeline::Engine;
//! use credvet::request::ValidationRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::from_config(EngineConfig::from_env()).await?;
//!
//! let request = ValidationRequest::builder()
//!     .provider_id(42)
//!     .npi("1234567890")
//!     .name("Jane Smith")
//!     .specialty("Cardiology")
//!     .state("CA")
//!     .build()?;
//!
//! let handle = engine.spawn(request);
//! let final_state = handle.wait().await?;
//! println!("stage = {}", final_state.stage);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Recoverable failures become data: a failed source query is recorded on
//! its [`sources::SourceRecord`], a failed stage populates
//! [`state::RunState::errors`] and triggers a terminal `FAILED` progress
//! event. The pipeline task itself never unwinds on an expected failure.
//!
//! ## Module guide
//!
//! - [`config`] — environment-driven engine configuration
//! - [`request`] — immutable validation request and input validation
//! - [`state`] — stage markers and the per-run state accumulator
//! - [`sources`] — source clients and the partial-failure-tolerant aggregator
//! - [`validate`] — field-group comparators and conflict detection
//! - [`enrich`] — missing-field backfill with provenance tagging
//! - [`score`] — weighted trust scoring, grades, recommendations
//! - [`pipeline`] — stage trait, executor, engine, and job handles
//! - [`notify`] — best-effort progress notification
//! - [`store`] — embedding-indexed result persistence and similarity search

pub mod config;
pub mod enrich;
pub mod notify;
pub mod pipeline;
pub mod request;
pub mod score;
pub mod sources;
pub mod state;
pub mod store;
pub mod validate;

/// Re-exports for convenient access to the core types.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::enrich::{EnrichmentEngine, EnrichmentResult, Provenance};
    pub use crate::notify::{HttpNotifier, ProgressNotifier, ProgressStatus, ProgressUpdate};
    pub use crate::pipeline::{
        Engine, EngineBuilder, JobHandle, JobStatus, PipelineExecutor, PipelineStage,
        StageContext, StageError,
    };
    pub use crate::request::{RequestError, ValidationRequest};
    pub use crate::score::{Grade, Recommendation, TrustScoreResult, TrustScorer};
    pub use crate::sources::{
        IngestedData, SourceAggregator, SourceClient, SourceError, SourceFields, SourceRecord,
        SourceTag,
    };
    pub use crate::state::{RunState, Stage, StageFailure};
    pub use crate::store::{
        Embedder, HashEmbedder, NewRecord, ResultStore, SimilaritySearch, SqliteResultStore,
        StoreError, StoredRecord,
    };
    pub use crate::validate::{CrossValidator, ValidationResult};
}
