//! End-to-end demo: validate one provider record and inspect the result.
//!
//! Wires an engine from the environment (see `src/config.rs` for the
//! recognized `CREDVET_*` variables), runs the full four-stage pipeline,
//! and prints the trust score, grade, and stored-record history.
//!
//! Running this demo:
//! ```bash
//! cargo run --example validate_provider
//! ```
//!
//! The NPI registry lookup goes to the real public API; everything else
//! (store, embedder, notifier) uses local defaults unless configured.

use credvet::config::EngineConfig;
use credvet::pipeline::Engine;
use credvet::request::ValidationRequest;
use credvet::store::{ResultStore, SqliteResultStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = EngineConfig::from_env();
    let db_path = config.db_path.clone();
    let engine = Engine::from_config(config).await?;

    let request = ValidationRequest::builder()
        .provider_id(42)
        .npi("1234567890")
        .name("Jane Smith")
        .specialty("Cardiology")
        .state("CA")
        .build()?;

    info!(job_id = %request.job_id, "submitting validation job");
    let handle = engine.spawn(request);
    let state = handle.wait().await?;

    println!("stage:          {}", state.stage);
    if let Some(validation) = &state.validation {
        println!("conflicts:      {:?}", validation.conflicts);
        println!("confidence:     {}", validation.confidence);
    }
    if let Some(trust) = &state.trust {
        println!("trust score:    {}", trust.score);
        println!("grade:          {}", trust.grade);
        println!("recommendation: {:?}", trust.recommendation);
        println!("human review:   {}", trust.human_review_required);
    }
    for failure in &state.errors {
        println!("failure at {}: {}", failure.stage, failure.message);
    }

    // Free-text search over everything validated so far.
    let similar = engine
        .outcome_search()
        .search("cardiology approved", 3)
        .await?;
    for (record, similarity) in similar {
        println!(
            "similar:        id={} provider={} similarity={similarity:.3}",
            record.id, record.provider_id
        );
    }

    // Point lookup against the store the engine just wrote to.
    let store = SqliteResultStore::open(&db_path).await?;
    if let Some(record) = store.find_by_provider(42).await? {
        println!(
            "stored record:  id={} score={} stage={}",
            record.id, record.trust_score, record.validation_stage
        );
    }
    println!("total records:  {}", store.count().await?);

    Ok(())
}
