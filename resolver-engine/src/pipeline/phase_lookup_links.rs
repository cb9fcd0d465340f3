//! Phase 1: link from lookup sources
//!
//! Products whose records carry no performer links get names from the
//! externally-crawled lookup table, keyed by normalized maker code.
//! Candidate names pass a validity filter before performers are upserted
//! and linked. Lookup volume is capped per run.

use super::{BatchOrchestrator, PhaseOutcome, RunContext};
use crate::matching::code_matcher::derive_normalized_code;
use crate::normalize::is_fake_performer_name;
use resolver_common::Result;

use super::statistics::PhaseStats;

/// Tokens that mark a string as catalog noise rather than a person name
const NAME_DENY_TOKENS: &[&str] = &[
    "dvd",
    "blu-ray",
    "set",
    "complete",
    "best",
    "セット",
    "特典",
    "オムニバス",
    "総集編",
    "まとめ",
    "他多数",
];

/// Comprehensive validity filter for lookup-sourced names: sane length,
/// at least one word character, no catalog noise, not a placeholder.
pub(super) fn is_valid_performer_name(name: &str) -> bool {
    let trimmed = name.trim();
    let char_count = trimmed.chars().count();
    if !(2..=30).contains(&char_count) {
        return false;
    }
    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return false;
    }
    let lowered = trimmed.to_lowercase();
    if NAME_DENY_TOKENS.iter().any(|t| lowered.contains(t)) {
        return false;
    }
    !is_fake_performer_name(trimmed)
}

impl BatchOrchestrator {
    pub(super) async fn phase_lookup_links(&self, ctx: &mut RunContext) -> Result<PhaseOutcome> {
        let records = crate::db::fetch_unlinked_records(&self.db, ctx.limit).await?;

        tracing::info!(
            unlinked = records.len(),
            "Phase lookup_links: resolving names for unlinked products"
        );

        let mut stats = PhaseStats::default();
        let mut consecutive_errors = 0usize;
        let mut lookups = 0usize;

        for record in &records {
            if ctx.over_budget() || lookups >= self.config.batch.max_lookups_per_run {
                return Ok(PhaseOutcome::aborted(stats));
            }

            stats.processed += 1;

            let Some(code) = derive_normalized_code(record) else {
                stats.skipped += 1;
                continue;
            };

            lookups += 1;
            let result = self.link_from_lookup(ctx, record.product_id, &code).await;

            match result {
                Ok(0) => {
                    consecutive_errors = 0;
                    stats.skipped += 1;
                }
                Ok(linked) => {
                    consecutive_errors = 0;
                    stats.created += linked;
                    ctx.touched.products.insert(record.product_id);
                }
                Err(e) => {
                    stats.errors += 1;
                    consecutive_errors += 1;
                    tracing::warn!(
                        record_id = record.id,
                        code = %code,
                        error = %e,
                        "Lookup linking failed"
                    );
                    if consecutive_errors >= ctx.error_cap {
                        return Ok(PhaseOutcome::aborted(stats));
                    }
                }
            }
        }

        Ok(PhaseOutcome::completed(stats))
    }

    /// Link every valid looked-up name to the product. Returns the number
    /// of links made (0 when the lookup had no usable counterpart, which
    /// is not an error).
    async fn link_from_lookup(
        &self,
        ctx: &mut RunContext,
        product_id: i64,
        code: &str,
    ) -> Result<usize> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT performer_name FROM source_name_lookup WHERE maker_code = ?",
        )
        .bind(code)
        .fetch_all(&self.db)
        .await?;

        let mut linked = 0usize;
        for name in names.iter().filter(|n| is_valid_performer_name(n)) {
            if ctx.dry_run {
                linked += 1;
                continue;
            }
            let performer_id = self.performers.upsert(name.trim()).await?;
            if self.performers.link(product_id, performer_id).await? {
                linked += 1;
            }
            ctx.touched.performers.insert(performer_id);
        }

        Ok(linked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plausible_names() {
        assert!(is_valid_performer_name("Yui Hatano"));
        assert!(is_valid_performer_name("波多野結衣"));
    }

    #[test]
    fn rejects_catalog_noise_and_placeholders() {
        assert!(!is_valid_performer_name("DVDセット"));
        assert!(!is_valid_performer_name("総集編ベスト"));
        assert!(!is_valid_performer_name("素人, 24"));
        assert!(!is_valid_performer_name("x"));
        assert!(!is_valid_performer_name("1234"));
        assert!(!is_valid_performer_name(&"あ".repeat(40)));
    }
}
