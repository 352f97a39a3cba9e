//! The workflow engine: stage trait, executor, engine, and job handles.
//!
//! [`Engine`] is the dependency container. Every collaborator — the
//! three source clients, the notifier, the result store, the embedder —
//! is injected at construction, either explicitly through
//! [`EngineBuilder`] or from configuration via [`Engine::from_config`].
//! There are no process-wide singletons; two engines with different
//! wiring coexist in one process, which is what the tests do.

mod executor;
mod handle;
mod stage;

pub use executor::{ExecutorBuilder, MissingCollaborator, PipelineExecutor};
pub use handle::{JobError, JobHandle, JobStatus};
pub use stage::{
    EnrichmentStage, IngestionStage, PipelineStage, ScoringStage, StageContext, StageError,
    ValidationStage,
};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::enrich::EnrichmentEngine;
use crate::notify::{HttpNotifier, NullNotifier, ProgressNotifier};
use crate::request::ValidationRequest;
use crate::score::TrustScorer;
use crate::sources::{
    BoardClient, DirectoryClient, NpiRegistryClient, SourceAggregator, SourceClient,
};
use crate::state::{RunState, Stage};
use crate::store::{
    Embedder, HashEmbedder, HttpEmbedder, ResultStore, SimilaritySearch, SqliteResultStore,
};
use crate::validate::CrossValidator;

/// Failures while wiring an [`Engine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// An HTTP client could not be constructed.
    #[error("http client construction failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The result store could not be opened.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    /// A required collaborator was not provided.
    #[error(transparent)]
    Missing(#[from] MissingCollaborator),
}

/// The assembled validation engine.
pub struct Engine {
    executor: Arc<PipelineExecutor>,
    search: SimilaritySearch,
}

impl Engine {
    /// Start wiring an engine by hand.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Wire an engine from configuration: real HTTP source clients, the
    /// SQLite store at the configured path, an HTTP notifier when an
    /// endpoint is set, and the local embedder unless an embeddings
    /// endpoint is configured.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when an HTTP client cannot be built or
    /// the store cannot be opened.
    pub async fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let registry = Arc::new(NpiRegistryClient::new(
            config.npi_registry_url.clone(),
            config.http_timeout,
        )?);

        let notifier: Arc<dyn ProgressNotifier> = match &config.notify_endpoint {
            Some(endpoint) => Arc::new(HttpNotifier::new(endpoint.clone(), config.http_timeout)?),
            None => Arc::new(NullNotifier),
        };

        let embedder: Arc<dyn Embedder> = match &config.embeddings_endpoint {
            Some(endpoint) => Arc::new(HttpEmbedder::new(
                endpoint.clone(),
                config.embeddings_model.clone(),
                config.http_timeout,
            )?),
            None => Arc::new(HashEmbedder::new()),
        };

        let store = Arc::new(SqliteResultStore::open(&config.db_path).await?);

        Engine::builder()
            .registry_client(registry)
            .notifier(notifier)
            .embedder(embedder)
            .store(store)
            .persistence(config.persist_attempts, config.persist_backoff)
            .build()
    }

    /// Run the pipeline on the caller's task and return the final state.
    pub async fn run(&self, request: ValidationRequest) -> RunState {
        self.executor.execute(request).await
    }

    /// Free-text similarity search over this engine's stored outcomes,
    /// using the same embedder that indexed them.
    #[must_use]
    pub fn outcome_search(&self) -> SimilaritySearch {
        self.search.clone()
    }

    /// Spawn the pipeline as an independent task and return a handle.
    #[must_use]
    pub fn spawn(&self, request: ValidationRequest) -> JobHandle {
        let job_id = request.job_id.clone();
        let executor = Arc::clone(&self.executor);
        let (tx, rx) = watch::channel(JobStatus::Running);

        let join = tokio::spawn(async move {
            let state = executor.execute(request).await;
            let status = match (&state.stage, &state.trust) {
                (Stage::Done, Some(trust)) => JobStatus::Completed { score: trust.score },
                _ => JobStatus::Failed {
                    error: state
                        .last_error()
                        .unwrap_or("run ended without a result")
                        .to_string(),
                },
            };
            let _ = tx.send(status);
            state
        });

        JobHandle::new(job_id, rx, join)
    }
}

/// Builder for [`Engine`]. Board and directory clients, the validator,
/// the enricher, and the scorer default to the standard implementations;
/// the registry client, notifier, embedder, and store must be provided.
#[derive(Default)]
pub struct EngineBuilder {
    registry: Option<Arc<dyn SourceClient>>,
    board: Option<Arc<dyn SourceClient>>,
    directory: Option<Arc<dyn SourceClient>>,
    notifier: Option<Arc<dyn ProgressNotifier>>,
    embedder: Option<Arc<dyn Embedder>>,
    store: Option<Arc<dyn ResultStore>>,
    persist_attempts: u32,
    persist_backoff: std::time::Duration,
}

impl EngineBuilder {
    #[must_use]
    pub fn registry_client(mut self, client: Arc<dyn SourceClient>) -> Self {
        self.registry = Some(client);
        self
    }

    #[must_use]
    pub fn board_client(mut self, client: Arc<dyn SourceClient>) -> Self {
        self.board = Some(client);
        self
    }

    #[must_use]
    pub fn directory_client(mut self, client: Arc<dyn SourceClient>) -> Self {
        self.directory = Some(client);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Persistence retry policy; defaults to a single attempt.
    #[must_use]
    pub fn persistence(mut self, attempts: u32, backoff: std::time::Duration) -> Self {
        self.persist_attempts = attempts;
        self.persist_backoff = backoff;
        self
    }

    /// Assemble the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Missing`] when a collaborator with no
    /// default was not provided.
    pub fn build(self) -> Result<Engine, EngineError> {
        let registry = self
            .registry
            .ok_or(MissingCollaborator("a registry client"))?;
        let board = self.board.unwrap_or_else(|| Arc::new(BoardClient::new()));
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(DirectoryClient::new()));
        let notifier = self.notifier.ok_or(MissingCollaborator("a notifier"))?;
        let embedder = self.embedder.ok_or(MissingCollaborator("an embedder"))?;
        let store = self.store.ok_or(MissingCollaborator("a result store"))?;

        let aggregator = Arc::new(SourceAggregator::new(registry, board, directory));
        let search = SimilaritySearch::new(Arc::clone(&store), Arc::clone(&embedder));

        let executor = PipelineExecutor::builder()
            .add_stage(IngestionStage::new(aggregator))
            .add_stage(ValidationStage::new(CrossValidator::new()))
            .add_stage(EnrichmentStage::new(EnrichmentEngine::new()))
            .add_stage(ScoringStage::new(TrustScorer::new()))
            .notifier(notifier)
            .embedder(embedder)
            .store(store)
            .persistence(self.persist_attempts, self.persist_backoff)
            .build()?;

        Ok(Engine {
            executor: Arc::new(executor),
            search,
        })
    }
}
