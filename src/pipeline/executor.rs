//! The [`PipelineExecutor`] — drives one run through the four stages.
//!
//! # Execution model
//!
//! 1. A `workflow/STARTED` event is emitted.
//! 2. Stages run sequentially in their declared order; after each, a
//!    `COMPLETED` event carries that stage's detail payload.
//! 3. A [`StageError`](super::stage::StageError) stops the run: it is recorded on the state, the
//!    stage marker flips to [`Stage::Failed`], and a terminal
//!    `workflow/FAILED` event is emitted. The task never unwinds.
//! 4. On success the outcome is embedded and persisted with bounded
//!    retry; if persistence is exhausted the computed trust score still
//!    rides the terminal `FAILED` event.
//! 5. Exactly one terminal event (`workflow/COMPLETED` or
//!    `workflow/FAILED`) is emitted per run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::notify::{ProgressNotifier, ProgressStatus, ProgressUpdate};
use crate::state::{RunState, Stage};
use crate::store::{outcome_summary, Embedder, NewRecord, ResultStore};

use super::stage::{PipelineStage, StageContext};

// ── PipelineExecutor ────────────────────────────────────────────────────

/// Orchestrates one validation run end to end.
///
/// Created via [`ExecutorBuilder`]. All collaborators are injected, so
/// tests can substitute scripted stages, a recording notifier, or an
/// in-memory store.
pub struct PipelineExecutor {
    stages: Vec<Arc<dyn PipelineStage>>,
    notifier: Arc<dyn ProgressNotifier>,
    store: Arc<dyn ResultStore>,
    embedder: Arc<dyn Embedder>,
    persist_attempts: u32,
    persist_backoff: Duration,
}

impl PipelineExecutor {
    /// Start building an executor.
    #[must_use]
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    /// Run the pipeline for one request and return the final state.
    ///
    /// Never fails at the call site: every expected failure is folded
    /// into the returned [`RunState`].
    pub async fn execute(&self, request: crate::request::ValidationRequest) -> RunState {
        let ctx = StageContext {
            job_id: request.job_id.clone(),
            provider_id: request.provider_id,
        };
        let mut state = RunState::new(request);

        info!(job_id = %ctx.job_id, provider_id = ctx.provider_id, "workflow started");
        self.notify(&ctx, "workflow", ProgressStatus::Started, serde_json::json!({}))
            .await;

        for stage in &self.stages {
            let marker = stage.stage();
            // Clone so the accumulated state survives a stage failure.
            match stage.run(state.clone(), &ctx).await {
                Ok(next) => {
                    state = next;
                    state.stage = marker.next().unwrap_or(Stage::Done);
                    self.notify(
                        &ctx,
                        marker.event_label(),
                        ProgressStatus::Completed,
                        stage.completion_data(&state),
                    )
                    .await;
                }
                Err(err) => {
                    return self.fail(state, &ctx, marker, err.to_string()).await;
                }
            }
        }

        self.persist_and_finish(state, &ctx).await
    }

    /// Persist the completed run, then emit the terminal event.
    async fn persist_and_finish(&self, mut state: RunState, ctx: &StageContext) -> RunState {
        let trust_score = state.trust.as_ref().map(|t| t.score);

        match self.persist(&state).await {
            Ok(record_id) => {
                info!(
                    job_id = %ctx.job_id,
                    provider_id = ctx.provider_id,
                    record_id,
                    score = trust_score,
                    "workflow completed"
                );
                self.notify(
                    ctx,
                    "workflow",
                    ProgressStatus::Completed,
                    serde_json::json!({
                        "recordId": record_id,
                        "trustScore": trust_score,
                    }),
                )
                .await;
                state
            }
            Err(message) => {
                // Surface the score the run did compute before reporting
                // the job as failed. Persistence is not a pipeline stage,
                // so the failure is recorded under `Failed` with its own
                // prefix rather than attributed to a stage.
                state.record_failure(Stage::Failed, format!("result persistence: {message}"));
                state.stage = Stage::Failed;
                error!(
                    job_id = %ctx.job_id,
                    provider_id = ctx.provider_id,
                    error = %message,
                    "workflow failed to persist"
                );
                self.notify(
                    ctx,
                    "workflow",
                    ProgressStatus::Failed,
                    serde_json::json!({
                        "error": message,
                        "trustScore": trust_score,
                    }),
                )
                .await;
                state
            }
        }
    }

    /// Record a stage failure and emit the terminal `FAILED` event.
    async fn fail(
        &self,
        mut state: RunState,
        ctx: &StageContext,
        stage: Stage,
        message: String,
    ) -> RunState {
        state.record_failure(stage, &message);
        state.stage = Stage::Failed;
        error!(
            job_id = %ctx.job_id,
            provider_id = ctx.provider_id,
            failed_stage = %stage,
            error = %message,
            "workflow failed"
        );
        self.notify(
            ctx,
            "workflow",
            ProgressStatus::Failed,
            serde_json::json!({
                "failedStage": stage.event_label(),
                "error": message,
            }),
        )
        .await;
        state
    }

    /// Embed the outcome summary and insert the record, retrying the
    /// insert with linear backoff.
    async fn persist(&self, state: &RunState) -> Result<i64, String> {
        let summary = outcome_summary(state);
        let embedding = self
            .embedder
            .embed(&summary)
            .await
            .map_err(|err| err.to_string())?;

        let record = NewRecord {
            provider_id: state.request.provider_id,
            npi: state.request.npi.clone(),
            embedding,
            trust_score: state.trust.as_ref().map_or(0.0, |t| t.score),
            validation_stage: state.stage.to_string(),
        };

        let mut last_error = String::new();
        for attempt in 1..=self.persist_attempts.max(1) {
            match self.store.insert(record.clone()).await {
                Ok(stored) => return Ok(stored.id),
                Err(err) => {
                    last_error = err.to_string();
                    warn!(
                        attempt,
                        attempts = self.persist_attempts,
                        error = %last_error,
                        "result persistence failed"
                    );
                    if attempt < self.persist_attempts {
                        tokio::time::sleep(self.persist_backoff * attempt).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn notify(
        &self,
        ctx: &StageContext,
        stage: &str,
        status: ProgressStatus,
        data: serde_json::Value,
    ) {
        self.notifier
            .send(ProgressUpdate::new(
                ctx.job_id.clone(),
                ctx.provider_id,
                stage,
                status,
                data,
            ))
            .await;
    }
}

// ── ExecutorBuilder ─────────────────────────────────────────────────────

/// Builder for [`PipelineExecutor`]. Stages run in the order they are
/// added.
#[derive(Default)]
pub struct ExecutorBuilder {
    stages: Vec<Arc<dyn PipelineStage>>,
    notifier: Option<Arc<dyn ProgressNotifier>>,
    store: Option<Arc<dyn ResultStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    persist_attempts: u32,
    persist_backoff: Duration,
}

/// A collaborator the builder cannot default.
#[derive(Debug, thiserror::Error)]
#[error("pipeline executor is missing {0}")]
pub struct MissingCollaborator(pub &'static str);

impl ExecutorBuilder {
    /// Add a stage at the end of the run order.
    #[must_use]
    pub fn add_stage(mut self, stage: impl PipelineStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Add a pre-wrapped `Arc<dyn PipelineStage>`.
    #[must_use]
    pub fn add_shared_stage(mut self, stage: Arc<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Persistence retry policy: `attempts` tries with `backoff × n`
    /// linear delay between them.
    #[must_use]
    pub fn persistence(mut self, attempts: u32, backoff: Duration) -> Self {
        self.persist_attempts = attempts;
        self.persist_backoff = backoff;
        self
    }

    /// Build the executor.
    ///
    /// # Errors
    ///
    /// Returns [`MissingCollaborator`] when the notifier, store, or
    /// embedder was not provided.
    pub fn build(self) -> Result<PipelineExecutor, MissingCollaborator> {
        Ok(PipelineExecutor {
            stages: self.stages,
            notifier: self.notifier.ok_or(MissingCollaborator("a notifier"))?,
            store: self.store.ok_or(MissingCollaborator("a result store"))?,
            embedder: self.embedder.ok_or(MissingCollaborator("an embedder"))?,
            persist_attempts: self.persist_attempts.max(1),
            persist_backoff: self.persist_backoff,
        })
    }
}
