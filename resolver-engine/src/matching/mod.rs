//! Tiered confidence matching
//!
//! Two read-only matchers run in priority order against the store:
//! exact/normalized code lookup first, trigram title similarity with
//! performer overlap second. Both return transient [`MatchResult`]s;
//! all grouping writes happen in the group manager.

pub mod code_matcher;
pub mod fuzzy_matcher;
pub mod similarity;

pub use code_matcher::CodeMatcher;
pub use fuzzy_matcher::FuzzyMatcher;

use serde::Serialize;

/// How a match was established, ordered by decreasing confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Identical maker code (confidence 100)
    CodeExact,
    /// Equal normalized codes (confidence 95)
    CodeNormalized,
    /// Similarity >= 0.8 and full performer overlap (confidence 90)
    TitlePerformerHigh,
    /// Similarity >= 0.7 and >= 2 overlapping performers (confidence 80)
    TitlePerformerMedium,
    /// Similarity >= 0.6 and >= 1 overlapping performer (confidence 70)
    TitlePerformerLow,
    /// Similarity >= 0.9 and durations within 5 minutes (confidence 65)
    TitleOnlyStrict,
    /// Similarity >= 0.85 and identical release date (confidence 60)
    TitleOnlyRelaxed,
    /// Seed membership of a freshly created group
    GroupSeed,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::CodeExact => "code_exact",
            MatchMethod::CodeNormalized => "code_normalized",
            MatchMethod::TitlePerformerHigh => "title_performer_high",
            MatchMethod::TitlePerformerMedium => "title_performer_medium",
            MatchMethod::TitlePerformerLow => "title_performer_low",
            MatchMethod::TitleOnlyStrict => "title_only_strict",
            MatchMethod::TitleOnlyRelaxed => "title_only_relaxed",
            MatchMethod::GroupSeed => "group_seed",
        }
    }
}

/// Transient output of one matching attempt. Never persisted; the group
/// manager writes membership rows derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// The already-stored record this candidate matched
    pub record_id: i64,
    /// Existing group of the matched record, when it has one
    pub group_id: Option<i64>,
    /// Confidence score 0-100
    pub confidence: u8,
    /// How the match was established
    pub method: MatchMethod,
    /// Title similarity when a fuzzy rule fired
    pub title_similarity: Option<f64>,
    /// Overlapping performer count when performer evidence was used
    pub matched_performers: Option<usize>,
}
