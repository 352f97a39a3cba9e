//! Source clients and the partial-failure-tolerant aggregator.
//!
//! Ingestion queries three independent sources concurrently: the CMS NPI
//! registry, the state licensing board, and a business directory. Each
//! client implements [`SourceClient`]; the [`SourceAggregator`] guards
//! every fetch so that a single source outage degrades the data instead
//! of failing the run.

mod board;
mod directory;
mod npi;

pub use board::BoardClient;
pub use directory::DirectoryClient;
pub use npi::NpiRegistryClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::request::ValidationRequest;

// ── Tags ────────────────────────────────────────────────────────────────

/// Identity of a data source, used as the key of [`IngestedData`] and the
/// reliability table in scoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// The CMS National Provider Identifier registry.
    NpiRegistry,
    /// The state medical licensing board.
    StateMedicalBoard,
    /// A public business directory.
    BusinessDirectory,
    /// Secondary third-party lookup used only during enrichment.
    ThirdPartyApi,
}

impl SourceTag {
    /// Stable string form used in payloads and stored summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::NpiRegistry => "npi_registry",
            SourceTag::StateMedicalBoard => "state_medical_board",
            SourceTag::BusinessDirectory => "business_directory",
            SourceTag::ThirdPartyApi => "third_party_api",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Failure modes of a single source fetch.
///
/// All variants are recoverable at the aggregation level: the aggregator
/// converts them into a `found: false` record.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source responded but had no record for the provider.
    #[error("no record found for npi {npi}")]
    NotFound { npi: String },

    /// Transport-level failure (timeout, connection refused, TLS, ...).
    #[error("request to {1} failed: {0}")]
    Transport(#[source] reqwest::Error, SourceTag),

    /// The source responded with a shape we could not interpret.
    #[error("{tag} returned an unexpected response: {detail}")]
    Malformed { tag: SourceTag, detail: String },
}

// ── Records ─────────────────────────────────────────────────────────────

/// Typed fields a source may report. All optional; each client fills the
/// subset it knows about.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceFields {
    pub name: Option<String>,
    pub license_number: Option<String>,
    pub license_status: Option<String>,
    pub license_expires: Option<String>,
    pub disciplinary_actions: Option<u32>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub address_count: Option<u32>,
    pub rating: Option<f64>,
    pub taxonomy: Option<String>,
}

/// Outcome of querying one source.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceRecord {
    /// Whether the source had usable data for this provider.
    pub found: bool,
    /// Which source produced this record.
    pub source: SourceTag,
    /// The fields the source reported (empty when not found).
    pub fields: SourceFields,
    /// Failure description when the fetch did not succeed.
    pub error: Option<String>,
}

impl SourceRecord {
    /// A successful fetch with data.
    #[must_use]
    pub fn found(source: SourceTag, fields: SourceFields) -> Self {
        Self {
            found: true,
            source,
            fields,
            error: None,
        }
    }

    /// The source answered but had no record for the provider.
    #[must_use]
    pub fn missing(source: SourceTag) -> Self {
        Self {
            found: false,
            source,
            fields: SourceFields::default(),
            error: None,
        }
    }

    /// The fetch itself failed.
    #[must_use]
    pub fn failed(source: SourceTag, error: impl Into<String>) -> Self {
        Self {
            found: false,
            source,
            fields: SourceFields::default(),
            error: Some(error.into()),
        }
    }
}

/// Aggregated output of the ingestion stage. All three primary source
/// tags are always present, found or not.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestedData {
    pub records: FxHashMap<SourceTag, SourceRecord>,
    pub ingested_at: DateTime<Utc>,
}

impl IngestedData {
    /// The record for `tag`, if the aggregator produced one.
    #[must_use]
    pub fn get(&self, tag: SourceTag) -> Option<&SourceRecord> {
        self.records.get(&tag)
    }

    /// The record for `tag` only when the source had usable data.
    #[must_use]
    pub fn found(&self, tag: SourceTag) -> Option<&SourceRecord> {
        self.records.get(&tag).filter(|r| r.found)
    }

    /// How many sources produced usable data.
    #[must_use]
    pub fn found_count(&self) -> usize {
        self.records.values().filter(|r| r.found).count()
    }
}

// ── Client trait ────────────────────────────────────────────────────────

/// One external data source.
///
/// Implementations are injected into the engine, so tests can substitute
/// scripted sources without touching the network.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Which source this client speaks for.
    fn tag(&self) -> SourceTag;

    /// Fetch fields for the requested provider.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on lookup miss, transport failure, or an
    /// uninterpretable response. The aggregator recovers from all of them.
    async fn fetch(&self, request: &ValidationRequest) -> Result<SourceFields, SourceError>;
}

// ── Aggregator ──────────────────────────────────────────────────────────

/// Queries all three primary sources concurrently and tolerates partial
/// failure.
pub struct SourceAggregator {
    registry: std::sync::Arc<dyn SourceClient>,
    board: std::sync::Arc<dyn SourceClient>,
    directory: std::sync::Arc<dyn SourceClient>,
}

impl SourceAggregator {
    #[must_use]
    pub fn new(
        registry: std::sync::Arc<dyn SourceClient>,
        board: std::sync::Arc<dyn SourceClient>,
        directory: std::sync::Arc<dyn SourceClient>,
    ) -> Self {
        Self {
            registry,
            board,
            directory,
        }
    }

    /// Fetch from every source and assemble a complete [`IngestedData`].
    ///
    /// Never fails: each fetch is guarded independently, and an erroring
    /// source yields a `found: false` record carrying the error message.
    pub async fn ingest(&self, request: &ValidationRequest) -> IngestedData {
        let (registry, board, directory) = tokio::join!(
            guarded_fetch(self.registry.as_ref(), request),
            guarded_fetch(self.board.as_ref(), request),
            guarded_fetch(self.directory.as_ref(), request),
        );

        let mut records = FxHashMap::default();
        for record in [registry, board, directory] {
            records.insert(record.source, record);
        }

        IngestedData {
            records,
            ingested_at: Utc::now(),
        }
    }
}

async fn guarded_fetch(client: &dyn SourceClient, request: &ValidationRequest) -> SourceRecord {
    let tag = client.tag();
    match client.fetch(request).await {
        Ok(fields) => SourceRecord::found(tag, fields),
        Err(SourceError::NotFound { npi }) => {
            warn!(source = %tag, %npi, "source has no record for provider");
            SourceRecord::missing(tag)
        }
        Err(err) => {
            warn!(source = %tag, error = %err, "source fetch failed");
            SourceRecord::failed(tag, err.to_string())
        }
    }
}
