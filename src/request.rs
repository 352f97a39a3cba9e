//! The immutable validation request.
//!
//! A [`ValidationRequest`] is created once per intake and never mutated.
//! Construction goes through [`ValidationRequestBuilder`], which validates
//! the identifying fields up front so the pipeline can assume a
//! well-formed request everywhere downstream.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of an NPI (National Provider Identifier).
pub const NPI_MAX_LEN: usize = 10;

/// Structured output from the external document-ingestion collaborator.
///
/// The pipeline never calls that service directly, but a caller may attach
/// its output to a request; the enrichment stage then uses it as a
/// secondary backfill source.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentExtract {
    /// A text-bearing document that was parsed directly.
    Parseable {
        text_preview: String,
        bbox_count: u32,
    },
    /// A scanned document that went through OCR.
    Scanned {
        ocr_preview: String,
        word_count: u32,
    },
}

impl DocumentExtract {
    /// The extracted text, regardless of how it was obtained.
    #[must_use]
    pub fn preview(&self) -> &str {
        match self {
            Self::Parseable { text_preview, .. } => text_preview,
            Self::Scanned { ocr_preview, .. } => ocr_preview,
        }
    }
}

/// Immutable input describing one provider-validation job.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationRequest {
    /// Job identifier; generated when the caller does not supply one.
    pub job_id: String,
    /// Internal provider identifier in the system of record.
    pub provider_id: i64,
    /// National Provider Identifier (≤10 digits).
    pub npi: String,
    /// Declared provider name.
    pub name: String,
    /// Declared specialty.
    pub specialty: String,
    /// Two-letter state code of the declared practice location.
    pub state: String,
    /// Optional structured document extract used during enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentExtract>,
}

impl ValidationRequest {
    /// Start building a request.
    #[must_use]
    pub fn builder() -> ValidationRequestBuilder {
        ValidationRequestBuilder::default()
    }
}

/// Errors produced while validating request fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// A required field was empty or missing.
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    /// The NPI did not look like a provider identifier.
    #[error("invalid npi '{npi}': {reason}")]
    InvalidNpi { npi: String, reason: &'static str },
}

/// Builder for [`ValidationRequest`]; `build()` performs field validation.
#[derive(Debug, Default)]
pub struct ValidationRequestBuilder {
    job_id: Option<String>,
    provider_id: Option<i64>,
    npi: Option<String>,
    name: Option<String>,
    specialty: Option<String>,
    state: Option<String>,
    document: Option<DocumentExtract>,
}

impl ValidationRequestBuilder {
    /// Set an explicit job identifier. When omitted a v4 UUID is assigned.
    #[must_use]
    pub fn job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    /// Set the internal provider identifier.
    #[must_use]
    pub fn provider_id(mut self, id: i64) -> Self {
        self.provider_id = Some(id);
        self
    }

    /// Set the NPI.
    #[must_use]
    pub fn npi(mut self, npi: impl Into<String>) -> Self {
        self.npi = Some(npi.into());
        self
    }

    /// Set the declared provider name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the declared specialty.
    #[must_use]
    pub fn specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    /// Set the practice-location state code.
    #[must_use]
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Attach a document extract for enrichment.
    #[must_use]
    pub fn document(mut self, document: DocumentExtract) -> Self {
        self.document = Some(document);
        self
    }

    /// Validate the collected fields and build the request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when a required field is empty or the NPI
    /// is not a digit string of at most [`NPI_MAX_LEN`] characters.
    pub fn build(self) -> Result<ValidationRequest, RequestError> {
        let npi = required(self.npi, "npi")?;
        if npi.len() > NPI_MAX_LEN {
            return Err(RequestError::InvalidNpi {
                npi,
                reason: "longer than 10 characters",
            });
        }
        if !npi.chars().all(|c| c.is_ascii_digit()) {
            return Err(RequestError::InvalidNpi {
                npi,
                reason: "contains non-digit characters",
            });
        }

        Ok(ValidationRequest {
            job_id: self
                .job_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            provider_id: self
                .provider_id
                .ok_or(RequestError::MissingField { field: "provider_id" })?,
            npi,
            name: required(self.name, "name")?,
            specialty: required(self.specialty, "specialty")?,
            state: required(self.state, "state")?,
            document: self.document,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, RequestError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RequestError::MissingField { field }),
    }
}
