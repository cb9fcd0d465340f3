//! Code matcher
//!
//! Exact and normalized maker-code lookup. First hit wins; absence of a
//! code is expected and common (roughly a third of sources never expose
//! one), so "no match" is a plain `Ok(None)`.

use crate::normalize::{extract_bracketed_code, normalize_product_code};
use resolver_common::config::MatchingConfig;
use resolver_common::db::models::CandidateRecord;
use resolver_common::Result;
use sqlx::SqlitePool;

use super::{MatchMethod, MatchResult};

pub struct CodeMatcher {
    db: SqlitePool,
}

impl CodeMatcher {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Find a code-based match for one candidate record.
    ///
    /// 1. Exact maker-code hit against another record -> confidence 100.
    /// 2. Normalized-code hit against a group's canonical code, falling
    ///    back to a bounded scan of recent coded records -> confidence 95.
    pub async fn find_match(
        &self,
        record: &CandidateRecord,
        config: &MatchingConfig,
    ) -> Result<Option<MatchResult>> {
        // Step 1: exact maker code, excluding self. Prefer an already
        // grouped record so the group id rides along.
        if let Some(code) = record.maker_code.as_deref().filter(|c| !c.is_empty()) {
            let row: Option<(i64, Option<i64>)> = sqlx::query_as(
                r#"
                SELECT ps.id, m.group_id
                FROM product_sources ps
                LEFT JOIN identity_group_members m ON m.record_id = ps.id
                WHERE ps.maker_code = ? AND ps.id != ?
                ORDER BY m.group_id IS NULL, ps.id
                LIMIT 1
                "#,
            )
            .bind(code)
            .bind(record.id)
            .fetch_optional(&self.db)
            .await?;

            if let Some((record_id, group_id)) = row {
                tracing::debug!(
                    record_id = record.id,
                    matched = record_id,
                    code = %code,
                    "Exact maker code match"
                );
                return Ok(Some(MatchResult {
                    record_id,
                    group_id,
                    confidence: 100,
                    method: MatchMethod::CodeExact,
                    title_similarity: None,
                    matched_performers: None,
                }));
            }
        }

        // Step 2: normalized code derived from the record itself
        let Some(normalized) = derive_normalized_code(record) else {
            return Ok(None);
        };

        // Existing group whose canonical code equals this value
        let group: Option<(i64, Option<i64>)> = sqlx::query_as(
            "SELECT id, master_record_id FROM identity_groups WHERE canonical_code = ? LIMIT 1",
        )
        .bind(&normalized)
        .fetch_optional(&self.db)
        .await?;

        if let Some((group_id, master)) = group {
            let record_id = match master {
                Some(id) => id,
                None => {
                    sqlx::query_scalar(
                        "SELECT record_id FROM identity_group_members
                         WHERE group_id = ? ORDER BY record_id LIMIT 1",
                    )
                    .bind(group_id)
                    .fetch_one(&self.db)
                    .await?
                }
            };
            tracing::debug!(
                record_id = record.id,
                group_id,
                code = %normalized,
                "Normalized code matched a group's canonical code"
            );
            return Ok(Some(MatchResult {
                record_id,
                group_id: Some(group_id),
                confidence: 95,
                method: MatchMethod::CodeNormalized,
                title_similarity: None,
                matched_performers: None,
            }));
        }

        // Bounded window over recent coded records. Old unmatched records
        // can fall outside the window; accepted recall trade-off.
        let recent: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, maker_code FROM product_sources
            WHERE maker_code IS NOT NULL AND id != ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(record.id)
        .bind(config.recent_code_window)
        .fetch_all(&self.db)
        .await?;

        for (candidate_id, candidate_code) in recent {
            if normalize_product_code(&candidate_code).as_deref() == Some(normalized.as_str()) {
                let group_id: Option<i64> = sqlx::query_scalar(
                    "SELECT group_id FROM identity_group_members WHERE record_id = ?",
                )
                .bind(candidate_id)
                .fetch_optional(&self.db)
                .await?;

                tracing::debug!(
                    record_id = record.id,
                    matched = candidate_id,
                    code = %normalized,
                    "Normalized code match in recent window"
                );
                return Ok(Some(MatchResult {
                    record_id: candidate_id,
                    group_id,
                    confidence: 95,
                    method: MatchMethod::CodeNormalized,
                    title_similarity: None,
                    matched_performers: None,
                }));
            }
        }

        Ok(None)
    }
}

/// Derive a comparable normalized code for a record: its own maker code,
/// else its normalized id with the source prefix segment stripped, else a
/// bracketed code embedded in the title.
pub fn derive_normalized_code(record: &CandidateRecord) -> Option<String> {
    if let Some(code) = record.maker_code.as_deref() {
        if let Some(normalized) = normalize_product_code(code) {
            return Some(normalized);
        }
    }

    // normalized_id carries a source prefix segment, e.g. "dmm_ssis00865"
    if let Some((_, rest)) = record.normalized_id.split_once('_') {
        if let Some(normalized) = normalize_product_code(rest) {
            return Some(normalized);
        }
    }

    extract_bracketed_code(&record.title)
}
