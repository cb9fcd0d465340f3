//! Phase 0: resolution sweep
//!
//! Resolves ungrouped candidate records into identity groups. Incremental
//! runs need no external checkpoint: the ungrouped query is the resume
//! point, so a crashed run is continued by re-invoking it.

use super::{BatchOrchestrator, PhaseOutcome, RunContext};
use crate::resolver::{MatchDecision, ResolutionOutcome};
use resolver_common::Result;

use super::statistics::PhaseStats;

impl BatchOrchestrator {
    pub(super) async fn phase_resolution(&self, ctx: &mut RunContext) -> Result<PhaseOutcome> {
        let grouped_before = crate::db::count_grouped(&self.db).await?;
        let records = crate::db::fetch_ungrouped(
            &self.db,
            ctx.target_sources.as_deref(),
            ctx.limit,
        )
        .await?;

        tracing::info!(
            ungrouped = records.len(),
            grouped_before,
            "Phase resolution: sweeping ungrouped records"
        );

        let mut stats = PhaseStats::default();
        let mut consecutive_errors = 0usize;

        for record in &records {
            if ctx.over_budget() {
                tracing::warn!(stats = %stats, "Budget exhausted mid-phase, aborting resolution");
                return Ok(PhaseOutcome::aborted(stats));
            }

            stats.processed += 1;

            let outcome = if ctx.dry_run {
                // Same decision procedure, writes suppressed
                self.resolver.decide(record).await.map(|decision| match decision {
                    MatchDecision::AlreadyGrouped { .. } => Outcome::Skipped,
                    MatchDecision::Match(_) => Outcome::Matched,
                    MatchDecision::NoMatch => Outcome::Created,
                })
            } else {
                self.resolver.resolve_record(record).await.map(|outcome| match outcome {
                    ResolutionOutcome::AlreadyGrouped { .. } => Outcome::Skipped,
                    ResolutionOutcome::Matched { .. } => Outcome::Matched,
                    ResolutionOutcome::CreatedGroup { .. } => Outcome::Created,
                })
            };

            match outcome {
                Ok(Outcome::Matched) => {
                    consecutive_errors = 0;
                    stats.merged += 1;
                    ctx.touched.products.insert(record.product_id);
                }
                Ok(Outcome::Created) => {
                    consecutive_errors = 0;
                    stats.created += 1;
                    ctx.touched.products.insert(record.product_id);
                }
                Ok(Outcome::Skipped) => {
                    consecutive_errors = 0;
                    stats.skipped += 1;
                }
                Err(e) => {
                    stats.errors += 1;
                    consecutive_errors += 1;
                    tracing::warn!(record_id = record.id, error = %e, "Record resolution failed");
                    if consecutive_errors >= ctx.error_cap {
                        tracing::error!(
                            consecutive_errors,
                            "Consecutive error cap hit, aborting resolution phase"
                        );
                        return Ok(PhaseOutcome::aborted(stats));
                    }
                }
            }
        }

        Ok(PhaseOutcome::completed(stats))
    }
}

enum Outcome {
    Matched,
    Created,
    Skipped,
}
