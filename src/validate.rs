//! Cross-source field validation.
//!
//! Three comparators check the ingested records against each other and
//! against the declared request: name, license, and contact. Each group
//! yields a verdict with a consistency flag and confidence; inconsistent
//! groups are recorded as named conflicts. The aggregate confidence is
//! `1.0 − 0.2 × conflicts` and is deliberately left unclamped — a
//! negative value reads as "deeply conflicted" downstream.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::request::ValidationRequest;
use crate::sources::{IngestedData, SourceTag};

// Per-group confidences are placeholder heuristics carried from the
// initial rollout, not measured match rates.
const NAME_CONFIDENCE: f64 = 0.95;
const LICENSE_CONFIDENCE: f64 = 0.90;
const CONTACT_CONFIDENCE: f64 = 0.75;

/// Days before expiration at which a license counts as expiring soon.
const EXPIRY_WINDOW_DAYS: i64 = 90;

// ── Verdicts ────────────────────────────────────────────────────────────

/// Name comparator output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NameCheck {
    pub consistent: bool,
    /// Sources whose name data corroborated the declared name.
    pub sources_matched: u32,
    pub confidence: f64,
}

/// License comparator output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LicenseCheck {
    pub consistent: bool,
    pub active: bool,
    pub expires_soon: bool,
    pub confidence: f64,
}

/// Contact comparator output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContactCheck {
    pub consistent: bool,
    pub phone_verified: bool,
    pub address_verified: bool,
    pub confidence: f64,
}

/// Full output of the validation stage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub name: NameCheck,
    pub license: LicenseCheck,
    pub contact: ContactCheck,
    /// Conflict labels by group: `name_mismatch`, `license_mismatch`,
    /// `contact_mismatch`.
    pub conflicts: Vec<String>,
    pub overall_valid: bool,
    /// `1.0 − 0.2 × conflicts.len()`, unclamped.
    pub confidence: f64,
}

// ── Validator ───────────────────────────────────────────────────────────

/// Runs the three comparators over one provider's ingested records.
#[derive(Debug, Default)]
pub struct CrossValidator;

impl CrossValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compare the ingested records and collect conflicts.
    #[must_use]
    pub fn validate(&self, data: &IngestedData, request: &ValidationRequest) -> ValidationResult {
        let name = self.check_name(data, request);
        let license = self.check_license(data);
        let contact = self.check_contact(data);

        let mut conflicts = Vec::new();
        if !name.consistent {
            conflicts.push("name_mismatch".to_string());
        }
        if !license.consistent {
            conflicts.push("license_mismatch".to_string());
        }
        if !contact.consistent {
            conflicts.push("contact_mismatch".to_string());
        }

        let confidence = 1.0 - 0.2 * conflicts.len() as f64;
        let overall_valid = conflicts.is_empty();

        info!(
            provider_id = request.provider_id,
            conflicts = conflicts.len(),
            confidence,
            "cross-validation complete"
        );

        ValidationResult {
            name,
            license,
            contact,
            conflicts,
            overall_valid,
            confidence,
        }
    }

    /// Registry name vs declared name, token-wise and case-insensitive.
    /// A missing registry record cannot contradict the declaration.
    fn check_name(&self, data: &IngestedData, request: &ValidationRequest) -> NameCheck {
        let registry_name = data
            .found(SourceTag::NpiRegistry)
            .and_then(|r| r.fields.name.as_deref());

        let (consistent, sources_matched) = match registry_name {
            Some(name) if names_match(name, &request.name) => (true, 2),
            Some(name) => {
                debug!(declared = %request.name, registry = %name, "name tokens disagree");
                (false, 1)
            }
            None => (true, 1),
        };

        NameCheck {
            consistent,
            sources_matched,
            confidence: if consistent { NAME_CONFIDENCE } else { 0.0 },
        }
    }

    /// The board record must exist and report an active license.
    fn check_license(&self, data: &IngestedData) -> LicenseCheck {
        let board = data.found(SourceTag::StateMedicalBoard);
        let active = board
            .and_then(|r| r.fields.license_status.as_deref())
            .is_some_and(|status| status == "Active");
        let expires_soon = board
            .and_then(|r| r.fields.license_expires.as_deref())
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
            .is_some_and(|date| {
                date <= Utc::now().date_naive() + Duration::days(EXPIRY_WINDOW_DAYS)
            });

        let consistent = active;
        LicenseCheck {
            consistent,
            active,
            expires_soon,
            confidence: if consistent { LICENSE_CONFIDENCE } else { 0.0 },
        }
    }

    /// At least one contact channel must be corroborated by a source.
    fn check_contact(&self, data: &IngestedData) -> ContactCheck {
        let phone_verified = data.found(SourceTag::BusinessDirectory).is_some();
        let address_verified = data
            .found(SourceTag::NpiRegistry)
            .and_then(|r| r.fields.address_count)
            .is_some_and(|count| count > 0);

        let consistent = phone_verified || address_verified;
        ContactCheck {
            consistent,
            phone_verified,
            address_verified,
            confidence: if consistent { CONTACT_CONFIDENCE } else { 0.0 },
        }
    }
}

/// Case- and punctuation-insensitive token comparison. Every declared
/// token must appear in the candidate name, in any order.
fn names_match(candidate: &str, declared: &str) -> bool {
    let candidate_tokens: Vec<String> = name_tokens(candidate);
    let declared_tokens = name_tokens(declared);
    if declared_tokens.is_empty() {
        return false;
    }
    declared_tokens.iter().all(|t| candidate_tokens.contains(t))
}

fn name_tokens(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
