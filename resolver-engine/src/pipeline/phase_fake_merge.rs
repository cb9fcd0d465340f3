//! Phase 5: fake-name merge
//!
//! Performers created from placeholder labels ("Woman, 24, unpublished")
//! are resolved to a real identity when one is discoverable: the lookup
//! table and other same-code products are searched for a plausible real
//! name, and the fake performer merges into it. A placeholder with no
//! discoverable counterpart is left untouched; absence of a mapping is
//! not an error.

use super::phase_lookup_links::is_valid_performer_name;
use super::{BatchOrchestrator, PhaseOutcome, RunContext};
use crate::normalize::{extract_bracketed_code, is_fake_performer_name, normalize_product_code};
use resolver_common::Result;
use std::collections::HashSet;

use super::statistics::PhaseStats;

/// A discovered real identity for a placeholder performer
enum RealIdentity {
    /// An existing performer row
    Existing(i64),
    /// A name known only from the lookup table; upserted on live runs
    ByName(String),
}

impl BatchOrchestrator {
    pub(super) async fn phase_fake_merge(&self, ctx: &mut RunContext) -> Result<PhaseOutcome> {
        let performers = self.linked_performers(ctx.limit).await?;
        let fakes: Vec<_> = performers
            .into_iter()
            .filter(|p| is_fake_performer_name(&p.name))
            .collect();

        tracing::info!(fakes = fakes.len(), "Phase fake_merge: resolving placeholder names");

        let mut stats = PhaseStats::default();

        for fake in &fakes {
            if ctx.over_budget() {
                return Ok(PhaseOutcome::aborted(stats));
            }
            if ctx.merged_this_run.contains(&fake.id) {
                continue;
            }
            stats.processed += 1;

            let identity = match self.find_real_identity(fake.id).await {
                Ok(identity) => identity,
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(fake = fake.id, error = %e, "Real-identity search failed");
                    continue;
                }
            };

            let Some(identity) = identity else {
                // No discoverable counterpart; leave the placeholder be
                stats.skipped += 1;
                continue;
            };

            if ctx.skip_merge || ctx.dry_run {
                stats.skipped += 1;
                continue;
            }

            let real_id = match identity {
                RealIdentity::Existing(id) => id,
                RealIdentity::ByName(name) => {
                    let id = self.performers.upsert(&name).await?;
                    stats.created += 1;
                    id
                }
            };
            if real_id == fake.id {
                stats.skipped += 1;
                continue;
            }

            match self.performers.merge(real_id, fake.id).await {
                Ok(true) => {
                    stats.merged += 1;
                    ctx.merged_this_run.insert(fake.id);
                    ctx.touched.performers.insert(real_id);
                    tracing::info!(
                        fake = fake.id,
                        fake_name = %fake.name,
                        real = real_id,
                        "Merged placeholder into real performer"
                    );
                }
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(fake = fake.id, error = %e, "Fake merge failed");
                }
            }
        }

        Ok(PhaseOutcome::completed(stats))
    }

    /// Search for the real identity behind a placeholder performer.
    ///
    /// The maker-code variants of its linked products lead to (a) other
    /// products with the same normalized code whose performers carry real
    /// names, preferring the highest release count, and (b) lookup-table
    /// names for those codes.
    async fn find_real_identity(&self, fake_id: i64) -> Result<Option<RealIdentity>> {
        // Code variants of every product the placeholder is linked to
        let own_rows: Vec<(i64, Option<String>, String, String)> = sqlx::query_as(
            r#"
            SELECT ps.product_id, ps.maker_code, ps.normalized_id, ps.title
            FROM product_performers pp
            JOIN product_sources ps ON ps.product_id = pp.product_id
            WHERE pp.performer_id = ?
            "#,
        )
        .bind(fake_id)
        .fetch_all(&self.db)
        .await?;

        let own_products: HashSet<i64> = own_rows.iter().map(|r| r.0).collect();

        let mut codes: HashSet<String> = HashSet::new();
        for (_, maker_code, normalized_id, title) in &own_rows {
            if let Some(code) = maker_code.as_deref().and_then(normalize_product_code) {
                codes.insert(code);
            }
            if let Some((_, rest)) = normalized_id.split_once('_') {
                if let Some(code) = normalize_product_code(rest) {
                    codes.insert(code);
                }
            }
            if let Some(code) = extract_bracketed_code(title) {
                codes.insert(code);
            }
        }
        if codes.is_empty() {
            return Ok(None);
        }

        // (a) Same-code products already linked to a real performer.
        // Maker codes normalize in Rust, so the comparison happens here
        // over a bounded window rather than in SQL.
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

        let same_code_products: Vec<i64> = coded
            .into_iter()
            .filter(|(product_id, maker_code)| {
                !own_products.contains(product_id)
                    && normalize_product_code(maker_code)
                        .map(|c| codes.contains(&c))
                        .unwrap_or(false)
            })
            .map(|(product_id, _)| product_id)
            .collect();

        let mut best: Option<(i64, i64)> = None; // (performer_id, release_count)
        for product_id in same_code_products {
            let linked: Vec<(i64, String, i64)> = sqlx::query_as(
                r#"
                SELECT p.id, p.name, p.release_count
                FROM product_performers pp
                JOIN performers p ON p.id = pp.performer_id
                WHERE pp.product_id = ?
                "#,
            )
            .bind(product_id)
            .fetch_all(&self.db)
            .await?;

            for (performer_id, name, release_count) in linked {
                if performer_id == fake_id || is_fake_performer_name(&name) {
                    continue;
                }
                if best.map(|(_, count)| release_count > count).unwrap_or(true) {
                    best = Some((performer_id, release_count));
                }
            }
        }
        if let Some((performer_id, _)) = best {
            return Ok(Some(RealIdentity::Existing(performer_id)));
        }

        // (b) Lookup-table names for the code variants, deterministic
        // order for re-runs
        let mut sorted_codes: Vec<&String> = codes.iter().collect();
        sorted_codes.sort();
        for code in sorted_codes {
            let names: Vec<String> = sqlx::query_scalar(
                "SELECT DISTINCT performer_name FROM source_name_lookup
                 WHERE maker_code = ? ORDER BY performer_name",
            )
            .bind(code)
            .fetch_all(&self.db)
            .await?;

            if let Some(name) = names.into_iter().find(|n| is_valid_performer_name(n)) {
                return Ok(Some(RealIdentity::ByName(name.trim().to_string())));
            }
        }

        Ok(None)
    }
}
