//! CMS NPI registry client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::request::ValidationRequest;

use super::{SourceClient, SourceError, SourceFields, SourceTag};

/// Queries the public CMS NPI registry API (v2.1).
pub struct NpiRegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl NpiRegistryClient {
    /// # Errors
    ///
    /// Returns the underlying `reqwest` error when the HTTP client cannot
    /// be constructed.
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }
}

// Subset of the registry response we care about.
#[derive(Debug, Deserialize)]
struct RegistryResponse {
    #[serde(default)]
    result_count: u32,
    #[serde(default)]
    results: Vec<RegistryResult>,
}

#[derive(Debug, Deserialize)]
struct RegistryResult {
    #[serde(default)]
    basic: RegistryBasic,
    #[serde(default)]
    taxonomies: Vec<RegistryTaxonomy>,
    #[serde(default)]
    addresses: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryBasic {
    name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl RegistryBasic {
    fn display_name(&self) -> Option<String> {
        if let Some(name) = &self.name {
            return Some(name.clone());
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(one), None) | (None, Some(one)) => Some(one.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryTaxonomy {
    code: Option<String>,
}

#[async_trait]
impl SourceClient for NpiRegistryClient {
    fn tag(&self) -> SourceTag {
        SourceTag::NpiRegistry
    }

    async fn fetch(&self, request: &ValidationRequest) -> Result<SourceFields, SourceError> {
        let url = format!("{}/?number={}&version=2.1", self.base_url, request.npi);
        debug!(npi = %request.npi, "querying npi registry");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SourceError::Transport(e, SourceTag::NpiRegistry))?;

        let body: RegistryResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Transport(e, SourceTag::NpiRegistry))?;

        if body.result_count == 0 {
            return Err(SourceError::NotFound {
                npi: request.npi.clone(),
            });
        }
        let result = body.results.first().ok_or_else(|| SourceError::Malformed {
            tag: SourceTag::NpiRegistry,
            detail: "result_count > 0 but results empty".to_string(),
        })?;

        Ok(SourceFields {
            name: result.basic.display_name(),
            taxonomy: result.taxonomies.first().and_then(|t| t.code.clone()),
            address_count: Some(result.addresses.len() as u32),
            ..SourceFields::default()
        })
    }
}
