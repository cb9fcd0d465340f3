//! Fuzzy text matcher
//!
//! Trigram title similarity plus performer-name overlap, evaluated as a
//! tier table in priority order. Greedy best-first: candidates arrive
//! sorted by similarity, and the first candidate satisfying any rule
//! wins. Sources known to reuse identical titles for unrelated videos
//! are skipped entirely.

use crate::normalize::{normalize_title, normalized_name_set};
use resolver_common::config::MatchingConfig;
use resolver_common::db::models::CandidateRecord;
use resolver_common::Result;
use sqlx::SqlitePool;

use super::similarity::trigram_similarity;
use super::{MatchMethod, MatchResult};

/// Raw candidate row fetched for similarity scoring
#[derive(Debug, sqlx::FromRow)]
struct FuzzyCandidate {
    id: i64,
    normalized_title: String,
    release_date: Option<chrono::NaiveDate>,
    duration_minutes: Option<i64>,
    performer_names: String,
}

pub struct FuzzyMatcher {
    db: SqlitePool,
}

impl FuzzyMatcher {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Find a title-similarity match for one candidate record
    pub async fn find_match(
        &self,
        record: &CandidateRecord,
        config: &MatchingConfig,
    ) -> Result<Option<MatchResult>> {
        if config.fuzzy_excluded_sources.contains(&record.source) {
            tracing::debug!(
                record_id = record.id,
                source = %record.source,
                "Source excluded from title matching"
            );
            return Ok(None);
        }

        let title = if record.normalized_title.is_empty() {
            normalize_title(&record.title)
        } else {
            record.normalized_title.clone()
        };
        if title.is_empty() {
            return Ok(None);
        }

        // Candidate window: different source, not self, title length in a
        // band around ours. Jaccard overlap above the threshold requires
        // comparable trigram-set sizes, which tracks title length.
        let len = title.chars().count() as i64;
        let min_len = (len as f64 * config.min_title_similarity).floor() as i64;
        let max_len = (len as f64 / config.min_title_similarity).ceil() as i64;

        let rows: Vec<FuzzyCandidate> = sqlx::query_as(
            r#"
            SELECT id, normalized_title, release_date, duration_minutes, performer_names
            FROM product_sources
            WHERE source != ? AND id != ?
              AND length(normalized_title) BETWEEN ? AND ?
            "#,
        )
        .bind(&record.source)
        .bind(record.id)
        .bind(min_len)
        .bind(max_len)
        .fetch_all(&self.db)
        .await?;

        // Score, filter, sort descending, cap
        let mut scored: Vec<(f64, FuzzyCandidate)> = rows
            .into_iter()
            .filter_map(|c| {
                let sim = trigram_similarity(&title, &c.normalized_title);
                (sim >= config.min_title_similarity).then_some((sim, c))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        scored.truncate(config.max_fuzzy_candidates);

        let own_names = normalized_name_set(&record.performer_list());

        for (sim, candidate) in scored {
            if let Some(result) = self.evaluate_tiers(record, &own_names, sim, &candidate).await? {
                return Ok(Some(result));
            }
        }

        Ok(None)
    }

    /// Evaluate the tier table against one candidate, highest rule first
    async fn evaluate_tiers(
        &self,
        record: &CandidateRecord,
        own_names: &std::collections::HashSet<String>,
        similarity: f64,
        candidate: &FuzzyCandidate,
    ) -> Result<Option<MatchResult>> {
        let candidate_list: Vec<String> =
            serde_json::from_str(&candidate.performer_names).unwrap_or_default();
        let candidate_names = normalized_name_set(&candidate_list);
        let overlap = candidate_names.intersection(own_names).count();
        let all_overlap = !candidate_names.is_empty() && overlap == candidate_names.len();

        let tier = if similarity >= 0.8 && all_overlap {
            Some((90u8, MatchMethod::TitlePerformerHigh, Some(overlap)))
        } else if similarity >= 0.7 && overlap >= 2 {
            Some((80, MatchMethod::TitlePerformerMedium, Some(overlap)))
        } else if similarity >= 0.6 && overlap >= 1 {
            Some((70, MatchMethod::TitlePerformerLow, Some(overlap)))
        } else if similarity >= 0.9 && duration_within(record, candidate, 5) {
            Some((65, MatchMethod::TitleOnlyStrict, None))
        } else if similarity >= 0.85 && same_release_date(record, candidate) {
            Some((60, MatchMethod::TitleOnlyRelaxed, None))
        } else {
            None
        };

        let Some((confidence, method, matched_performers)) = tier else {
            return Ok(None);
        };

        let group_id: Option<i64> =
            sqlx::query_scalar("SELECT group_id FROM identity_group_members WHERE record_id = ?")
                .bind(candidate.id)
                .fetch_optional(&self.db)
                .await?;

        tracing::debug!(
            record_id = record.id,
            matched = candidate.id,
            method = method.as_str(),
            similarity,
            overlap,
            "Fuzzy title match"
        );

        Ok(Some(MatchResult {
            record_id: candidate.id,
            group_id,
            confidence,
            method,
            title_similarity: Some(similarity),
            matched_performers,
        }))
    }
}

fn duration_within(record: &CandidateRecord, candidate: &FuzzyCandidate, minutes: i64) -> bool {
    match (record.duration_minutes, candidate.duration_minutes) {
        (Some(a), Some(b)) => (a - b).abs() <= minutes,
        _ => false,
    }
}

fn same_release_date(record: &CandidateRecord, candidate: &FuzzyCandidate) -> bool {
    match (record.release_date, candidate.release_date) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
