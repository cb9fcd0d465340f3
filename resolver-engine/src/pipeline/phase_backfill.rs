//! Phase 6: debut-year backfill
//!
//! Derives `debut_year` for performers that lack one from the earliest
//! release date among their linked products. Implausible years are left
//! NULL rather than written.

use super::{BatchOrchestrator, PhaseOutcome, RunContext};
use chrono::{Datelike, Utc};
use resolver_common::Result;

use super::statistics::PhaseStats;

const EARLIEST_PLAUSIBLE_YEAR: i64 = 1970;

impl BatchOrchestrator {
    pub(super) async fn phase_backfill(&self, ctx: &mut RunContext) -> Result<PhaseOutcome> {
        let mut stats = PhaseStats::default();
        let current_year = Utc::now().year() as i64;

        // Earliest release year per performer missing a debut year
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT p.id, MIN(strftime('%Y', ps.release_date))
            FROM performers p
            JOIN product_performers pp ON pp.performer_id = p.id
            JOIN product_sources ps ON ps.product_id = pp.product_id
            WHERE p.debut_year IS NULL AND ps.release_date IS NOT NULL
            GROUP BY p.id
            ORDER BY p.id
            LIMIT ?
            "#,
        )
        .bind(ctx.limit)
        .fetch_all(&self.db)
        .await?;

        tracing::info!(candidates = rows.len(), "Phase debut_backfill: deriving debut years");

        for (performer_id, year) in rows {
            if ctx.over_budget() {
                return Ok(PhaseOutcome::aborted(stats));
            }
            stats.processed += 1;

            let year = match year.as_deref().and_then(|y| y.parse::<i64>().ok()) {
                Some(y) if (EARLIEST_PLAUSIBLE_YEAR..=current_year).contains(&y) => y,
                _ => {
                    stats.skipped += 1;
                    continue;
                }
            };

            if ctx.dry_run {
                stats.created += 1;
                continue;
            }

            let result =
                sqlx::query("UPDATE performers SET debut_year = ? WHERE id = ? AND debut_year IS NULL")
                    .bind(year)
                    .bind(performer_id)
                    .execute(&self.db)
                    .await?;

            if result.rows_affected() > 0 {
                stats.created += 1;
                ctx.touched.performers.insert(performer_id);
                tracing::debug!(performer = performer_id, year, "Backfilled debut year");
            } else {
                stats.skipped += 1;
            }
        }

        Ok(PhaseOutcome::completed(stats))
    }
}
