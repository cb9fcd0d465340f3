//! Phase 2: cross-source propagation
//!
//! Within each identity group, members with performer links donate their
//! link set to members without any. A second pass repeats the same logic
//! keyed on shared normalized maker code for records not (yet) in the
//! same group, recovering cases where grouping lagged behind code
//! assignment. Pure copying: no new performers are created here.

use super::{BatchOrchestrator, PhaseOutcome, RunContext};
use crate::normalize::normalize_product_code;
use resolver_common::Result;
use std::collections::{BTreeMap, HashSet};

use super::statistics::PhaseStats;

impl BatchOrchestrator {
    pub(super) async fn phase_propagation(&self, ctx: &mut RunContext) -> Result<PhaseOutcome> {
        let mut stats = PhaseStats::default();

        // Pass 1: group-keyed propagation
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT m.group_id, ps.product_id
            FROM identity_group_members m
            JOIN product_sources ps ON ps.id = m.record_id
            ORDER BY m.group_id, ps.product_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut by_group: BTreeMap<i64, HashSet<i64>> = BTreeMap::new();
        for (group_id, product_id) in rows {
            by_group.entry(group_id).or_default().insert(product_id);
        }

        for (group_id, products) in by_group.iter().take(ctx.limit as usize) {
            if ctx.over_budget() {
                return Ok(PhaseOutcome::aborted(stats));
            }
            if products.len() < 2 {
                continue;
            }
            stats.processed += 1;
            let products: Vec<i64> = products.iter().copied().collect();
            match self.copy_links_across(ctx, &products).await {
                Ok(0) => stats.skipped += 1,
                Ok(copied) => {
                    tracing::debug!(group_id, copied, "Propagated performer links within group");
                    stats.created += copied;
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(group_id, error = %e, "Group propagation failed");
                }
            }
        }

        // Pass 2: code-keyed propagation for records grouping hasn't
        // caught up with yet
        let coded: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT product_id, maker_code FROM product_sources
            WHERE maker_code IS NOT NULL
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(self.config.matching.recent_code_window)
        .fetch_all(&self.db)
        .await?;

        let mut by_code: BTreeMap<String, HashSet<i64>> = BTreeMap::new();
        for (product_id, maker_code) in coded {
            if let Some(code) = normalize_product_code(&maker_code) {
                by_code.entry(code).or_default().insert(product_id);
            }
        }

        for (code, products) in &by_code {
            if ctx.over_budget() {
                return Ok(PhaseOutcome::aborted(stats));
            }
            if products.len() < 2 {
                continue;
            }
            stats.processed += 1;
            let products: Vec<i64> = products.iter().copied().collect();
            match self.copy_links_across(ctx, &products).await {
                Ok(0) => stats.skipped += 1,
                Ok(copied) => {
                    tracing::debug!(code = %code, copied, "Propagated performer links by code");
                    stats.created += copied;
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(code = %code, error = %e, "Code propagation failed");
                }
            }
        }

        Ok(PhaseOutcome::completed(stats))
    }

    /// Copy the union of performer links held by any of `products` to the
    /// products holding none. Returns the number of links created.
    async fn copy_links_across(&self, ctx: &mut RunContext, products: &[i64]) -> Result<usize> {
        let mut linked_performers: HashSet<i64> = HashSet::new();
        let mut unlinked_products: Vec<i64> = Vec::new();

        for &product_id in products {
            let performers: Vec<i64> = sqlx::query_scalar(
                "SELECT performer_id FROM product_performers WHERE product_id = ?",
            )
            .bind(product_id)
            .fetch_all(&self.db)
            .await?;

            if performers.is_empty() {
                unlinked_products.push(product_id);
            } else {
                linked_performers.extend(performers);
            }
        }

        if linked_performers.is_empty() || unlinked_products.is_empty() {
            return Ok(0);
        }

        let mut copied = 0usize;
        for product_id in unlinked_products {
            for &performer_id in &linked_performers {
                if ctx.dry_run {
                    copied += 1;
                    continue;
                }
                if self.performers.link(product_id, performer_id).await? {
                    copied += 1;
                    ctx.touched.products.insert(product_id);
                    ctx.touched.performers.insert(performer_id);
                }
            }
        }

        Ok(copied)
    }
}
