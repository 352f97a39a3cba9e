//! Per-run pipeline state.
//!
//! A [`RunState`] is created from a [`ValidationRequest`] when a job is
//! accepted and is owned exclusively by that job's task. Each stage
//! consumes the state and returns an updated copy; the executor advances
//! the [`Stage`] marker between stages. Stage failures accumulate in
//! [`RunState::errors`] instead of unwinding the task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enrich::EnrichmentResult;
use crate::request::ValidationRequest;
use crate::score::TrustScoreResult;
use crate::sources::IngestedData;
use crate::validate::ValidationResult;

/// Position of a run in the pipeline.
///
/// The four working stages advance strictly in order; `Done` and `Failed`
/// are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Multi-source aggregation.
    Ingestion,
    /// Cross-source field validation.
    Validation,
    /// Missing-field backfill.
    Enrichment,
    /// Trust-score computation.
    Scoring,
    /// The run completed and its record was persisted.
    Done,
    /// The run aborted; see [`RunState::errors`].
    Failed,
}

impl Stage {
    /// The stage that follows this one, or `None` for terminal stages.
    #[must_use]
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Ingestion => Some(Stage::Validation),
            Stage::Validation => Some(Stage::Enrichment),
            Stage::Enrichment => Some(Stage::Scoring),
            Stage::Scoring => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    /// Whether this stage ends the run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// The stage label used in progress-notification payloads.
    #[must_use]
    pub fn event_label(self) -> &'static str {
        match self {
            Stage::Ingestion => "data_ingestion",
            Stage::Validation => "cross_validation",
            Stage::Enrichment => "enrichment",
            Stage::Scoring => "trust_scoring",
            Stage::Done | Stage::Failed => "workflow",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Ingestion => "ingestion",
            Stage::Validation => "validation",
            Stage::Enrichment => "enrichment",
            Stage::Scoring => "scoring",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// One recorded stage failure.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StageFailure {
    /// The stage that failed.
    pub stage: Stage,
    /// Human-readable failure description.
    pub message: String,
    /// When the failure was recorded.
    pub when: DateTime<Utc>,
}

impl StageFailure {
    /// Record a failure for `stage` with the current timestamp.
    #[must_use]
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            when: Utc::now(),
        }
    }
}

/// Mutable state threaded through one pipeline execution.
///
/// Owned by exactly one job task; never shared across concurrent runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunState {
    /// The immutable request this run was created from.
    pub request: ValidationRequest,
    /// Output of the ingestion stage.
    pub ingested: Option<IngestedData>,
    /// Output of the cross-validation stage.
    pub validation: Option<ValidationResult>,
    /// Output of the enrichment stage.
    pub enrichment: Option<EnrichmentResult>,
    /// Output of the scoring stage.
    pub trust: Option<TrustScoreResult>,
    /// Accumulated stage failures, oldest first.
    pub errors: Vec<StageFailure>,
    /// Current position in the pipeline.
    pub stage: Stage,
}

impl RunState {
    /// Initial state for a freshly accepted job.
    #[must_use]
    pub fn new(request: ValidationRequest) -> Self {
        Self {
            request,
            ingested: None,
            validation: None,
            enrichment: None,
            trust: None,
            errors: Vec::new(),
            stage: Stage::Ingestion,
        }
    }

    /// Append a stage failure.
    pub fn record_failure(&mut self, stage: Stage, message: impl Into<String>) {
        self.errors.push(StageFailure::new(stage, message));
    }

    /// The most recent failure message, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(|f| f.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ValidationRequest;

    fn request() -> ValidationRequest {
        ValidationRequest::builder()
            .provider_id(1)
            .npi("1234567890")
            .name("Jane Smith")
            .specialty("Cardiology")
            .state("CA")
            .build()
            .unwrap()
    }

    #[test]
    fn stage_order_is_fixed() {
        let mut stage = Stage::Ingestion;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                Stage::Ingestion,
                Stage::Validation,
                Stage::Enrichment,
                Stage::Scoring,
                Stage::Done,
            ]
        );
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(Stage::Failed.next().is_none());
    }

    #[test]
    fn event_labels_match_notification_contract() {
        assert_eq!(Stage::Ingestion.event_label(), "data_ingestion");
        assert_eq!(Stage::Validation.event_label(), "cross_validation");
        assert_eq!(Stage::Enrichment.event_label(), "enrichment");
        assert_eq!(Stage::Scoring.event_label(), "trust_scoring");
    }

    #[test]
    fn failures_accumulate_in_order() {
        let mut state = RunState::new(request());
        assert!(state.last_error().is_none());
        state.record_failure(Stage::Ingestion, "first");
        state.record_failure(Stage::Validation, "second");
        assert_eq!(state.errors.len(), 2);
        assert_eq!(state.last_error(), Some("second"));
    }
}
