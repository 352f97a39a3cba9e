//! Weighted trust scoring.
//!
//! The scorer combines per-field confidences from validation and
//! enrichment into one weighted trust score, then maps it to a letter
//! grade and an automated recommendation. Weights and thresholds come
//! from the credentialing policy and are fixed at compile time.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::enrich::EnrichmentResult;
use crate::sources::SourceTag;

// Policy weights. Must sum to 1.0.
const WEIGHT_NAME: f64 = 0.25;
const WEIGHT_LICENSE: f64 = 0.35;
const WEIGHT_CONTACT: f64 = 0.20;
const WEIGHT_COMPLETENESS: f64 = 0.20;

/// Scores below this always go to a human reviewer.
const HUMAN_REVIEW_THRESHOLD: f64 = 0.75;

// ── Outcome types ───────────────────────────────────────────────────────

/// Letter grade derived from the trust score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// A ≥ 0.90, B ≥ 0.80, C ≥ 0.70, D ≥ 0.60, else F.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.90 {
            Grade::A
        } else if score >= 0.80 {
            Grade::B
        } else if score >= 0.70 {
            Grade::C
        } else if score >= 0.60 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Automated decision derived from the trust score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approved,
    Review,
    Rejected,
}

impl Recommendation {
    /// Approved ≥ 0.80, Review ≥ 0.60, else Rejected.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.80 {
            Recommendation::Approved
        } else if score >= 0.60 {
            Recommendation::Review
        } else {
            Recommendation::Rejected
        }
    }
}

/// Per-field-group confidences that feed the weighted sum.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldScores {
    pub name_accuracy: f64,
    pub license_validity: f64,
    pub contact_accuracy: f64,
    pub data_completeness: f64,
}

/// Output of the scoring stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrustScoreResult {
    /// Weighted score in `[0, 1]`, rounded to two decimals.
    pub score: f64,
    /// Static per-source reliability, reported for transparency.
    pub source_reliability: FxHashMap<SourceTag, f64>,
    pub field_scores: FieldScores,
    pub grade: Grade,
    pub recommendation: Recommendation,
    pub human_review_required: bool,
}

// ── Scorer ──────────────────────────────────────────────────────────────

/// Computes the weighted trust score for one run.
#[derive(Debug, Default)]
pub struct TrustScorer;

impl TrustScorer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Score the enriched result.
    #[must_use]
    pub fn score(&self, enrichment: &EnrichmentResult) -> TrustScoreResult {
        let field_scores = FieldScores {
            name_accuracy: enrichment.validation.name.confidence,
            license_validity: enrichment.validation.license.confidence,
            contact_accuracy: enrichment.validation.contact.confidence,
            data_completeness: enrichment.completeness,
        };

        let score = weighted_score(&field_scores);
        let grade = Grade::from_score(score);
        let recommendation = Recommendation::from_score(score);

        info!(score, %grade, ?recommendation, "trust score computed");

        TrustScoreResult {
            score,
            source_reliability: source_reliability(),
            field_scores,
            grade,
            recommendation,
            human_review_required: score < HUMAN_REVIEW_THRESHOLD,
        }
    }
}

/// Static reliability table for the sources we pull from. These reflect
/// the operational track record of each upstream, not per-run data.
#[must_use]
pub fn source_reliability() -> FxHashMap<SourceTag, f64> {
    let mut table = FxHashMap::default();
    table.insert(SourceTag::NpiRegistry, 0.95);
    table.insert(SourceTag::StateMedicalBoard, 0.92);
    table.insert(SourceTag::BusinessDirectory, 0.70);
    table.insert(SourceTag::ThirdPartyApi, 0.65);
    table
}

fn weighted_score(fields: &FieldScores) -> f64 {
    let sum = fields.name_accuracy * WEIGHT_NAME
        + fields.license_validity * WEIGHT_LICENSE
        + fields.contact_accuracy * WEIGHT_CONTACT
        + fields.data_completeness * WEIGHT_COMPLETENESS;
    round2(sum)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
