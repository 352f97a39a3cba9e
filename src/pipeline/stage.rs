//! The [`PipelineStage`] trait and the four concrete stages.
//!
//! Stages are pure with respect to the run: each consumes a [`RunState`]
//! and returns the updated state, touching nothing outside it except its
//! injected collaborators. The executor owns stage ordering, progress
//! notification, and failure handling.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::enrich::EnrichmentEngine;
use crate::score::TrustScorer;
use crate::sources::SourceAggregator;
use crate::state::{RunState, Stage};
use crate::validate::CrossValidator;

// ── Context and errors ──────────────────────────────────────────────────

/// Per-run identifiers available to every stage.
#[derive(Clone, Debug)]
pub struct StageContext {
    pub job_id: String,
    pub provider_id: i64,
}

/// A stage-level failure. Caught by the executor; never unwinds the job
/// task.
#[derive(Debug, Error)]
pub enum StageError {
    /// An earlier stage's output was expected but absent.
    #[error("{stage} stage requires {what} from an earlier stage")]
    MissingInput { stage: Stage, what: &'static str },

    /// The stage itself could not produce a result.
    #[error("{stage} stage failed: {message}")]
    Failed { stage: Stage, message: String },
}

impl StageError {
    /// The stage this error originated in.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            StageError::MissingInput { stage, .. } | StageError::Failed { stage, .. } => *stage,
        }
    }
}

// ── Trait ───────────────────────────────────────────────────────────────

/// One step of the validation pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Which pipeline position this stage implements.
    fn stage(&self) -> Stage;

    /// Transform the run state.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] when required input is missing or the stage
    /// cannot produce its output.
    async fn run(&self, state: RunState, ctx: &StageContext) -> Result<RunState, StageError>;

    /// Detail payload for this stage's `COMPLETED` progress event.
    fn completion_data(&self, _state: &RunState) -> serde_json::Value {
        serde_json::json!({})
    }
}

// ── Concrete stages ─────────────────────────────────────────────────────

/// Multi-source aggregation.
pub struct IngestionStage {
    aggregator: Arc<SourceAggregator>,
}

impl IngestionStage {
    #[must_use]
    pub fn new(aggregator: Arc<SourceAggregator>) -> Self {
        Self { aggregator }
    }
}

#[async_trait]
impl PipelineStage for IngestionStage {
    fn stage(&self) -> Stage {
        Stage::Ingestion
    }

    async fn run(&self, mut state: RunState, ctx: &StageContext) -> Result<RunState, StageError> {
        info!(job_id = %ctx.job_id, provider_id = ctx.provider_id, "ingesting sources");
        let data = self.aggregator.ingest(&state.request).await;
        state.ingested = Some(data);
        Ok(state)
    }

    fn completion_data(&self, state: &RunState) -> serde_json::Value {
        serde_json::to_value(&state.ingested).unwrap_or_default()
    }
}

/// Cross-source field validation.
pub struct ValidationStage {
    validator: CrossValidator,
}

impl ValidationStage {
    #[must_use]
    pub fn new(validator: CrossValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl PipelineStage for ValidationStage {
    fn stage(&self) -> Stage {
        Stage::Validation
    }

    async fn run(&self, mut state: RunState, ctx: &StageContext) -> Result<RunState, StageError> {
        let ingested = state.ingested.as_ref().ok_or(StageError::MissingInput {
            stage: Stage::Validation,
            what: "ingested data",
        })?;

        info!(job_id = %ctx.job_id, provider_id = ctx.provider_id, "cross-validating");
        let result = self.validator.validate(ingested, &state.request);
        state.validation = Some(result);
        Ok(state)
    }

    fn completion_data(&self, state: &RunState) -> serde_json::Value {
        serde_json::to_value(&state.validation).unwrap_or_default()
    }
}

/// Missing-field backfill.
pub struct EnrichmentStage {
    engine: EnrichmentEngine,
}

impl EnrichmentStage {
    #[must_use]
    pub fn new(engine: EnrichmentEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl PipelineStage for EnrichmentStage {
    fn stage(&self) -> Stage {
        Stage::Enrichment
    }

    async fn run(&self, mut state: RunState, ctx: &StageContext) -> Result<RunState, StageError> {
        let validation = state.validation.clone().ok_or(StageError::MissingInput {
            stage: Stage::Enrichment,
            what: "validation result",
        })?;

        info!(job_id = %ctx.job_id, provider_id = ctx.provider_id, "enriching");
        let result = self.engine.enrich(validation, &state.request);
        state.enrichment = Some(result);
        Ok(state)
    }

    fn completion_data(&self, state: &RunState) -> serde_json::Value {
        serde_json::to_value(&state.enrichment).unwrap_or_default()
    }
}

/// Trust-score computation.
pub struct ScoringStage {
    scorer: TrustScorer,
}

impl ScoringStage {
    #[must_use]
    pub fn new(scorer: TrustScorer) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl PipelineStage for ScoringStage {
    fn stage(&self) -> Stage {
        Stage::Scoring
    }

    async fn run(&self, mut state: RunState, ctx: &StageContext) -> Result<RunState, StageError> {
        let enrichment = state.enrichment.as_ref().ok_or(StageError::MissingInput {
            stage: Stage::Scoring,
            what: "enrichment result",
        })?;

        info!(job_id = %ctx.job_id, provider_id = ctx.provider_id, "scoring");
        let result = self.scorer.score(enrichment);
        state.trust = Some(result);
        Ok(state)
    }

    fn completion_data(&self, state: &RunState) -> serde_json::Value {
        serde_json::to_value(&state.trust).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ValidationRequest;

    fn state() -> RunState {
        RunState::new(
            ValidationRequest::builder()
                .provider_id(7)
                .npi("1234567890")
                .name("Jane Smith")
                .specialty("Cardiology")
                .state("CA")
                .build()
                .unwrap(),
        )
    }

    fn ctx() -> StageContext {
        StageContext {
            job_id: "job-1".to_string(),
            provider_id: 7,
        }
    }

    #[tokio::test]
    async fn validation_without_ingestion_is_missing_input() {
        let stage = ValidationStage::new(CrossValidator::new());
        let err = stage.run(state(), &ctx()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Validation);
        assert!(matches!(err, StageError::MissingInput { .. }));
    }

    #[tokio::test]
    async fn scoring_without_enrichment_is_missing_input() {
        let stage = ScoringStage::new(TrustScorer::new());
        let err = stage.run(state(), &ctx()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Scoring);
    }
}
