//! Best-effort progress notification.
//!
//! The pipeline reports stage transitions to an external system of
//! record. Notifications are at-most-once: a delivery failure is logged
//! at warn and swallowed, never retried, and never affects the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Lifecycle status carried in a progress update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    Started,
    Completed,
    Failed,
}

/// One progress event. Serialized with camelCase keys to match the
/// receiving service's contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub job_id: String,
    pub provider_id: i64,
    /// Stage label, e.g. `workflow`, `data_ingestion`, `trust_scoring`.
    pub stage: String,
    pub status: ProgressStatus,
    /// Stage-specific detail payload.
    pub data: serde_json::Value,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        provider_id: i64,
        stage: impl Into<String>,
        status: ProgressStatus,
        data: serde_json::Value,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            provider_id,
            stage: stage.into(),
            status,
            data,
        }
    }
}

/// Sink for progress events. Implementations must be fire-and-forget:
/// `send` never returns an error and never blocks the pipeline on a slow
/// or absent receiver beyond its own bounded timeout.
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn send(&self, update: ProgressUpdate);
}

/// POSTs progress updates to an HTTP endpoint.
pub struct HttpNotifier {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    /// # Errors
    ///
    /// Returns the underlying `reqwest` error when the HTTP client cannot
    /// be constructed.
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ProgressNotifier for HttpNotifier {
    async fn send(&self, update: ProgressUpdate) {
        let outcome = self
            .http
            .post(&self.endpoint)
            .json(&update)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match outcome {
            Ok(_) => debug!(
                job_id = %update.job_id,
                stage = %update.stage,
                status = ?update.status,
                "progress update sent"
            ),
            Err(err) => warn!(
                job_id = %update.job_id,
                stage = %update.stage,
                error = %err,
                "progress update dropped"
            ),
        }
    }
}

/// Discards every update. Used when no endpoint is configured.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl ProgressNotifier for NullNotifier {
    async fn send(&self, _update: ProgressUpdate) {}
}
