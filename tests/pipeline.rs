//! End-to-end pipeline tests over scripted sources and in-memory stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use credvet::enrich::EnrichmentEngine;
use credvet::notify::{HttpNotifier, ProgressStatus};
use credvet::pipeline::{
    Engine, EnrichmentStage, IngestionStage, JobStatus, PipelineExecutor, PipelineStage,
    ScoringStage, StageContext, StageError, ValidationStage,
};
use credvet::score::{Grade, Recommendation};
use credvet::sources::{SourceAggregator, SourceTag};
use credvet::state::{RunState, Stage};
use credvet::store::{HashEmbedder, ResultStore, SqliteResultStore};
use credvet::validate::CrossValidator;

use common::{request, FailingStore, MemoryStore, RecordingNotifier, ScriptedSource};

fn engine(
    board: ScriptedSource,
    notifier: Arc<RecordingNotifier>,
    store: Arc<MemoryStore>,
) -> Engine {
    Engine::builder()
        .registry_client(Arc::new(ScriptedSource::registry_ok()))
        .board_client(Arc::new(board))
        .directory_client(Arc::new(ScriptedSource::directory_ok()))
        .notifier(notifier)
        .embedder(Arc::new(HashEmbedder::new()))
        .store(store)
        .persistence(2, Duration::from_millis(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn clean_run_completes_with_approved_score() {
    let notifier = RecordingNotifier::new();
    let store = MemoryStore::new();
    let engine = engine(ScriptedSource::board_ok(), Arc::clone(&notifier), Arc::clone(&store));

    let handle = engine.spawn(request(42));
    assert_eq!(handle.job_id(), "job-42");

    let state = handle.wait().await.unwrap();
    assert_eq!(state.stage, Stage::Done);
    assert!(state.errors.is_empty());

    // 0.95·0.25 + 0.90·0.35 + 0.75·0.20 + 0.85·0.20 = 0.8725 → 0.87
    let trust = state.trust.as_ref().unwrap();
    assert_eq!(trust.score, 0.87);
    assert_eq!(trust.grade, Grade::B);
    assert_eq!(trust.recommendation, Recommendation::Approved);
    assert!(!trust.human_review_required);

    let records = store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider_id, 42);
    assert_eq!(records[0].npi, "1234567890");
    assert_eq!(records[0].trust_score, 0.87);
    assert_eq!(records[0].validation_stage, "done");
}

#[tokio::test]
async fn progress_events_follow_the_stage_sequence() {
    let notifier = RecordingNotifier::new();
    let store = MemoryStore::new();
    let engine = engine(ScriptedSource::board_ok(), Arc::clone(&notifier), store);

    let state = engine.run(request(1)).await;
    assert_eq!(state.stage, Stage::Done);

    let sequence = notifier.sequence().await;
    assert_eq!(
        sequence,
        vec![
            ("workflow".to_string(), "Started".to_string()),
            ("data_ingestion".to_string(), "Completed".to_string()),
            ("cross_validation".to_string(), "Completed".to_string()),
            ("enrichment".to_string(), "Completed".to_string()),
            ("trust_scoring".to_string(), "Completed".to_string()),
            ("workflow".to_string(), "Completed".to_string()),
        ]
    );
}

#[tokio::test]
async fn board_outage_degrades_but_completes() {
    let notifier = RecordingNotifier::new();
    let store = MemoryStore::new();
    let engine = engine(
        ScriptedSource::down(SourceTag::StateMedicalBoard),
        notifier,
        Arc::clone(&store),
    );

    let state = engine.run(request(7)).await;
    assert_eq!(state.stage, Stage::Done);

    let ingested = state.ingested.as_ref().unwrap();
    assert!(!ingested.get(SourceTag::StateMedicalBoard).unwrap().found);
    assert_eq!(ingested.found_count(), 2);

    let validation = state.validation.as_ref().unwrap();
    assert_eq!(validation.conflicts, vec!["license_mismatch".to_string()]);
    assert!(!validation.overall_valid);

    // 0.95·0.25 + 0·0.35 + 0.75·0.20 + 0.85·0.20 = 0.5575 → 0.56
    let trust = state.trust.as_ref().unwrap();
    assert_eq!(trust.score, 0.56);
    assert_eq!(trust.recommendation, Recommendation::Rejected);
    assert!(trust.human_review_required);

    // The degraded outcome is still persisted.
    assert_eq!(store.records().await.len(), 1);
}

#[tokio::test]
async fn concurrent_runs_produce_independent_records() {
    let notifier = RecordingNotifier::new();
    let store = MemoryStore::new();
    let engine = engine(ScriptedSource::board_ok(), notifier, Arc::clone(&store));

    let a = engine.spawn(request(100));
    let b = engine.spawn(request(200));
    let (state_a, state_b) = tokio::join!(a.wait(), b.wait());
    assert_eq!(state_a.unwrap().stage, Stage::Done);
    assert_eq!(state_b.unwrap().stage, Stage::Done);

    let records = store.records().await;
    assert_eq!(records.len(), 2);
    let mut providers: Vec<i64> = records.iter().map(|r| r.provider_id).collect();
    providers.sort_unstable();
    assert_eq!(providers, vec![100, 200]);
}

#[tokio::test]
async fn rerunning_a_provider_appends_and_lookup_returns_the_newer_record() {
    let notifier = RecordingNotifier::new();
    let store = MemoryStore::new();
    let engine = engine(ScriptedSource::board_ok(), notifier, Arc::clone(&store));

    engine.run(request(42)).await;
    engine.run(request(42)).await;

    let records = store.records().await;
    assert_eq!(records.len(), 2);

    let latest = store.find_by_provider(42).await.unwrap().unwrap();
    assert_eq!(latest.id, records[1].id);

    let history = store.history(42).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].id > history[1].id);
}

#[tokio::test]
async fn persistence_exhaustion_fails_the_job_but_surfaces_the_score() {
    let notifier = RecordingNotifier::new();
    let engine = Engine::builder()
        .registry_client(Arc::new(ScriptedSource::registry_ok()))
        .board_client(Arc::new(ScriptedSource::board_ok()))
        .directory_client(Arc::new(ScriptedSource::directory_ok()))
        .notifier(notifier.clone())
        .embedder(Arc::new(HashEmbedder::new()))
        .store(Arc::new(FailingStore))
        .persistence(2, Duration::from_millis(1))
        .build()
        .unwrap();

    let handle = engine.spawn(request(9));
    let state = handle.wait().await.unwrap();

    assert_eq!(state.stage, Stage::Failed);
    assert!(!state.errors.is_empty());
    assert!(state.last_error().unwrap().contains("disk full"));
    // Attributed to persistence, not to a pipeline stage.
    assert_eq!(state.errors[0].stage, Stage::Failed);
    assert!(state.last_error().unwrap().starts_with("result persistence"));
    // The score was computed before persistence failed.
    assert_eq!(state.trust.as_ref().unwrap().score, 0.87);

    let updates = notifier.updates().await;
    let terminal: Vec<_> = updates
        .iter()
        .filter(|u| u.stage == "workflow" && u.status != ProgressStatus::Started)
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].status, ProgressStatus::Failed);
    assert_eq!(terminal[0].data["trustScore"], 0.87);
}

#[tokio::test]
async fn outcome_search_accepts_free_text_queries() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = SqliteResultStore::open(dir.path().join("outcomes.db"))
        .await
        .unwrap();
    let engine = Engine::builder()
        .registry_client(Arc::new(ScriptedSource::registry_ok()))
        .board_client(Arc::new(ScriptedSource::board_ok()))
        .directory_client(Arc::new(ScriptedSource::directory_ok()))
        .notifier(RecordingNotifier::new())
        .embedder(Arc::new(HashEmbedder::new()))
        .store(Arc::new(store))
        .persistence(1, Duration::ZERO)
        .build()
        .unwrap();

    let state = engine.run(request(42)).await;
    assert_eq!(state.stage, Stage::Done);

    // One call from query text to ranked records; no embedder wiring
    // on the caller's side.
    let results = engine
        .outcome_search()
        .search("provider 42 npi 1234567890 specialty Cardiology", 1)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0.provider_id, 42);
    assert_eq!(results[0].0.trust_score, 0.87);
}

#[tokio::test]
async fn spawned_job_status_becomes_completed_with_score() {
    let notifier = RecordingNotifier::new();
    let store = MemoryStore::new();
    let engine = engine(ScriptedSource::board_ok(), notifier, store);

    let handle = engine.spawn(request(5));
    assert!(matches!(
        handle.status(),
        JobStatus::Running | JobStatus::Completed { .. }
    ));

    while !handle.status().is_terminal() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(handle.status(), JobStatus::Completed { score: 0.87 });

    let state = handle.wait().await.unwrap();
    assert_eq!(state.stage, Stage::Done);
    assert_eq!(state.trust.unwrap().score, 0.87);
}

// ── Stage failure handling ──────────────────────────────────────────────

/// A stage that always fails.
struct ExplodingStage;

#[async_trait]
impl PipelineStage for ExplodingStage {
    fn stage(&self) -> Stage {
        Stage::Validation
    }

    async fn run(&self, _state: RunState, _ctx: &StageContext) -> Result<RunState, StageError> {
        Err(StageError::Failed {
            stage: Stage::Validation,
            message: "comparator panic".to_string(),
        })
    }
}

#[tokio::test]
async fn stage_failure_emits_one_terminal_failed_event() {
    let notifier = RecordingNotifier::new();
    let store = MemoryStore::new();

    let aggregator = Arc::new(SourceAggregator::new(
        Arc::new(ScriptedSource::registry_ok()),
        Arc::new(ScriptedSource::board_ok()),
        Arc::new(ScriptedSource::directory_ok()),
    ));
    let executor = PipelineExecutor::builder()
        .add_stage(IngestionStage::new(aggregator))
        .add_stage(ExplodingStage)
        .add_stage(EnrichmentStage::new(EnrichmentEngine::new()))
        .add_stage(ScoringStage::new(credvet::score::TrustScorer::new()))
        .notifier(notifier.clone())
        .embedder(Arc::new(HashEmbedder::new()))
        .store(store.clone())
        .persistence(1, Duration::ZERO)
        .build()
        .unwrap();

    let state = executor.execute(request(3)).await;
    assert_eq!(state.stage, Stage::Failed);
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].stage, Stage::Validation);
    // State accumulated before the failure survives.
    assert!(state.ingested.is_some());
    assert!(state.validation.is_none());

    let sequence = notifier.sequence().await;
    assert_eq!(
        sequence,
        vec![
            ("workflow".to_string(), "Started".to_string()),
            ("data_ingestion".to_string(), "Completed".to_string()),
            ("workflow".to_string(), "Failed".to_string()),
        ]
    );

    // Nothing is persisted for a failed run.
    assert_eq!(store.records().await.len(), 0);
}

#[tokio::test]
async fn missing_input_is_reported_not_panicked() {
    let notifier = RecordingNotifier::new();
    let store = MemoryStore::new();

    // Validation first, without ingestion.
    let executor = PipelineExecutor::builder()
        .add_stage(ValidationStage::new(CrossValidator::new()))
        .notifier(notifier.clone())
        .embedder(Arc::new(HashEmbedder::new()))
        .store(store)
        .persistence(1, Duration::ZERO)
        .build()
        .unwrap();

    let state = executor.execute(request(3)).await;
    assert_eq!(state.stage, Stage::Failed);
    assert!(state.last_error().unwrap().contains("ingested data"));
}

#[tokio::test]
async fn unreachable_notifier_does_not_change_the_outcome() {
    // Nothing listens on this port; every send is dropped after logging.
    let dead_notifier =
        Arc::new(HttpNotifier::new("http://127.0.0.1:1/progress", Duration::from_millis(200)).unwrap());
    let store = MemoryStore::new();
    let engine = Engine::builder()
        .registry_client(Arc::new(ScriptedSource::registry_ok()))
        .board_client(Arc::new(ScriptedSource::board_ok()))
        .directory_client(Arc::new(ScriptedSource::directory_ok()))
        .notifier(dead_notifier)
        .embedder(Arc::new(HashEmbedder::new()))
        .store(store.clone())
        .persistence(1, Duration::ZERO)
        .build()
        .unwrap();

    let state = engine.run(request(11)).await;
    assert_eq!(state.stage, Stage::Done);
    assert_eq!(state.trust.as_ref().unwrap().score, 0.87);
    assert_eq!(store.records().await.len(), 1);
}
