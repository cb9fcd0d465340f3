//! Phase 3: normalization-key dedup
//!
//! Performers with at least one product link are grouped by normalized
//! key; within each key group of size >= 2 the member with the highest
//! release count survives and absorbs the rest. Sharing a key makes
//! performers candidates; the merge itself is what confirms them.

use super::{BatchOrchestrator, PhaseOutcome, RunContext};
use crate::normalize::generate_normalized_key;
use resolver_common::Result;
use std::collections::BTreeMap;

use super::statistics::PhaseStats;

/// Lightweight performer row used by the dedup phases
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct DedupCandidate {
    pub id: i64,
    pub name: String,
    pub release_count: i64,
}

impl BatchOrchestrator {
    /// Performers holding at least one product link, in id order
    pub(super) async fn linked_performers(&self, limit: i64) -> Result<Vec<DedupCandidate>> {
        let rows = sqlx::query_as(
            r#"
            SELECT p.id, p.name, p.release_count
            FROM performers p
            WHERE EXISTS (SELECT 1 FROM product_performers pp WHERE pp.performer_id = p.id)
            ORDER BY p.id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub(super) async fn phase_key_dedup(&self, ctx: &mut RunContext) -> Result<PhaseOutcome> {
        let performers = self.linked_performers(ctx.limit).await?;

        let mut by_key: BTreeMap<String, Vec<DedupCandidate>> = BTreeMap::new();
        for performer in performers {
            let key = generate_normalized_key(&performer.name);
            if key.is_empty() {
                continue;
            }
            by_key.entry(key).or_default().push(performer);
        }

        let mut stats = PhaseStats::default();

        for (key, mut group) in by_key {
            if ctx.over_budget() {
                return Ok(PhaseOutcome::aborted(stats));
            }
            if group.len() < 2 {
                continue;
            }
            stats.processed += 1;

            if ctx.skip_merge || ctx.dry_run {
                stats.skipped += 1;
                continue;
            }

            // Highest release count survives; ties keep the oldest row
            group.sort_by(|a, b| b.release_count.cmp(&a.release_count).then(a.id.cmp(&b.id)));
            let winner = group[0].clone();

            for loser in &group[1..] {
                if ctx.merged_this_run.contains(&loser.id) {
                    stats.skipped += 1;
                    continue;
                }
                match self.performers.merge(winner.id, loser.id).await {
                    Ok(true) => {
                        stats.merged += 1;
                        ctx.merged_this_run.insert(loser.id);
                        ctx.touched.performers.insert(winner.id);
                        tracing::info!(
                            key = %key,
                            winner = winner.id,
                            loser = loser.id,
                            "Key dedup merged performers"
                        );
                    }
                    Ok(false) => stats.skipped += 1,
                    Err(e) => {
                        stats.errors += 1;
                        tracing::warn!(
                            winner = winner.id,
                            loser = loser.id,
                            error = %e,
                            "Key dedup merge failed"
                        );
                    }
                }
            }
        }

        Ok(PhaseOutcome::completed(stats))
    }
}
