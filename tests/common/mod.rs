//! Shared fixtures for integration tests: scripted sources, a recording
//! notifier, and in-memory stores.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use credvet::notify::{ProgressNotifier, ProgressUpdate};
use credvet::request::ValidationRequest;
use credvet::sources::{SourceClient, SourceError, SourceFields, SourceTag};
use credvet::store::{NewRecord, ResultStore, StoreError, StoredRecord};

/// A well-formed request for the given provider.
pub fn request(provider_id: i64) -> ValidationRequest {
    ValidationRequest::builder()
        .job_id(format!("job-{provider_id}"))
        .provider_id(provider_id)
        .npi("1234567890")
        .name("Jane Smith")
        .specialty("Cardiology")
        .state("CA")
        .build()
        .unwrap()
}

// ── Scripted sources ────────────────────────────────────────────────────

type Script = Box<dyn Fn(&ValidationRequest) -> Result<SourceFields, SourceError> + Send + Sync>;

/// A source client driven by a closure.
pub struct ScriptedSource {
    tag: SourceTag,
    script: Script,
}

impl ScriptedSource {
    pub fn new(
        tag: SourceTag,
        script: impl Fn(&ValidationRequest) -> Result<SourceFields, SourceError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            tag,
            script: Box::new(script),
        }
    }

    /// A registry client that echoes the declared name with one address.
    pub fn registry_ok() -> Self {
        Self::new(SourceTag::NpiRegistry, |req| {
            Ok(SourceFields {
                name: Some(req.name.to_uppercase()),
                taxonomy: Some("207RC0000X".to_string()),
                address_count: Some(1),
                ..SourceFields::default()
            })
        })
    }

    /// A board client reporting an active, far-future license.
    pub fn board_ok() -> Self {
        Self::new(SourceTag::StateMedicalBoard, |req| {
            Ok(SourceFields {
                license_number: Some(format!("{}-12345", req.state)),
                license_status: Some("Active".to_string()),
                license_expires: Some("2030-12-31".to_string()),
                disciplinary_actions: Some(0),
                ..SourceFields::default()
            })
        })
    }

    /// A directory client with a full contact profile.
    pub fn directory_ok() -> Self {
        Self::new(SourceTag::BusinessDirectory, |_| {
            Ok(SourceFields {
                phone: Some("+1-555-0123".to_string()),
                email: Some("jane.smith@healthcare.com".to_string()),
                address: Some("123 Medical Plaza".to_string()),
                rating: Some(4.5),
                ..SourceFields::default()
            })
        })
    }

    /// A client whose fetch always fails at the transport level.
    pub fn down(tag: SourceTag) -> Self {
        Self::new(tag, move |_| {
            Err(SourceError::Malformed {
                tag,
                detail: "connection refused".to_string(),
            })
        })
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    fn tag(&self) -> SourceTag {
        self.tag
    }

    async fn fetch(&self, request: &ValidationRequest) -> Result<SourceFields, SourceError> {
        (self.script)(request)
    }
}

// ── Recording notifier ──────────────────────────────────────────────────

/// Captures every progress update for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().await.clone()
    }

    /// `(stage, status)` pairs in emission order.
    pub async fn sequence(&self) -> Vec<(String, String)> {
        self.updates
            .lock()
            .await
            .iter()
            .map(|u| (u.stage.clone(), format!("{:?}", u.status)))
            .collect()
    }
}

#[async_trait]
impl ProgressNotifier for RecordingNotifier {
    async fn send(&self, update: ProgressUpdate) {
        self.updates.lock().await.push(update);
    }
}

// ── In-memory stores ────────────────────────────────────────────────────

/// Append-only in-memory store without similarity search.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn insert(&self, record: NewRecord) -> Result<StoredRecord, StoreError> {
        let mut records = self.records.lock().await;
        let stored = StoredRecord {
            id: records.len() as i64 + 1,
            provider_id: record.provider_id,
            npi: record.npi,
            embedding: record.embedding,
            trust_score: record.trust_score,
            validation_stage: record.validation_stage,
            created_at: Utc::now(),
        };
        records.push(stored.clone());
        Ok(stored)
    }

    async fn search_similar(
        &self,
        _query_embedding: &[f32],
        _top_k: usize,
    ) -> Result<Vec<(StoredRecord, f32)>, StoreError> {
        Ok(vec![])
    }

    async fn find_by_provider(&self, provider_id: i64) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.provider_id == provider_id)
            .cloned())
    }

    async fn history(&self, provider_id: i64) -> Result<Vec<StoredRecord>, StoreError> {
        let mut matching: Vec<StoredRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .cloned()
            .collect();
        matching.reverse();
        Ok(matching)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.lock().await.len())
    }
}

/// A store whose inserts always fail.
#[derive(Default)]
pub struct FailingStore;

#[async_trait]
impl ResultStore for FailingStore {
    async fn insert(&self, _record: NewRecord) -> Result<StoredRecord, StoreError> {
        Err(StoreError::Storage("disk full".to_string()))
    }

    async fn search_similar(
        &self,
        _query_embedding: &[f32],
        _top_k: usize,
    ) -> Result<Vec<(StoredRecord, f32)>, StoreError> {
        Err(StoreError::Storage("disk full".to_string()))
    }

    async fn find_by_provider(
        &self,
        _provider_id: i64,
    ) -> Result<Option<StoredRecord>, StoreError> {
        Err(StoreError::Storage("disk full".to_string()))
    }

    async fn history(&self, _provider_id: i64) -> Result<Vec<StoredRecord>, StoreError> {
        Err(StoreError::Storage("disk full".to_string()))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Err(StoreError::Storage("disk full".to_string()))
    }
}
