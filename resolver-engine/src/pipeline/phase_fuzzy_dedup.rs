//! Phase 4: fuzzy performer dedup
//!
//! Pairwise Jaro-Winkler over linked performers whose names are at least
//! three characters. Above the similarity threshold the lower release
//! count merges into the higher. Performers consumed earlier in the same
//! run are skipped.

use super::{BatchOrchestrator, PhaseOutcome, RunContext};
use crate::normalize::normalize_performer_name;
use resolver_common::Result;

use super::statistics::PhaseStats;

impl BatchOrchestrator {
    pub(super) async fn phase_fuzzy_dedup(&self, ctx: &mut RunContext) -> Result<PhaseOutcome> {
        let performers = self.linked_performers(ctx.limit).await?;

        let candidates: Vec<_> = performers
            .into_iter()
            .filter(|p| p.name.chars().count() >= 3)
            .collect();

        tracing::info!(
            candidates = candidates.len(),
            threshold = self.config.matching.performer_similarity_threshold,
            "Phase fuzzy_dedup: pairwise name comparison"
        );

        let mut stats = PhaseStats::default();

        for i in 0..candidates.len() {
            if ctx.over_budget() {
                return Ok(PhaseOutcome::aborted(stats));
            }

            let a = &candidates[i];
            if ctx.merged_this_run.contains(&a.id) {
                continue;
            }
            stats.processed += 1;

            for b in &candidates[i + 1..] {
                if ctx.merged_this_run.contains(&a.id) {
                    break;
                }
                if ctx.merged_this_run.contains(&b.id) {
                    continue;
                }

                let similarity = strsim::jaro_winkler(
                    &normalize_performer_name(&a.name),
                    &normalize_performer_name(&b.name),
                );
                if similarity <= self.config.matching.performer_similarity_threshold {
                    continue;
                }

                // Lower release count loses; ties keep the older row
                let (winner, loser) = if a.release_count >= b.release_count {
                    (a, b)
                } else {
                    (b, a)
                };

                if ctx.skip_merge || ctx.dry_run {
                    stats.skipped += 1;
                    continue;
                }

                match self.performers.merge(winner.id, loser.id).await {
                    Ok(true) => {
                        stats.merged += 1;
                        ctx.merged_this_run.insert(loser.id);
                        ctx.touched.performers.insert(winner.id);
                        tracing::info!(
                            winner = winner.id,
                            loser = loser.id,
                            similarity,
                            "Fuzzy dedup merged performers"
                        );
                    }
                    Ok(false) => stats.skipped += 1,
                    Err(e) => {
                        stats.errors += 1;
                        tracing::warn!(
                            winner = winner.id,
                            loser = loser.id,
                            error = %e,
                            "Fuzzy dedup merge failed"
                        );
                    }
                }
            }
        }

        Ok(PhaseOutcome::completed(stats))
    }
}
