//! Phase 7: statistics resync
//!
//! Recomputes denormalized aggregates from the link tables: per-performer
//! release counts and latest release dates, and per-product source
//! rollups. Scoped to the entities touched earlier in the run when any
//! were, otherwise a full bounded pass. Only rows whose recomputed values
//! differ are written.

use super::{BatchOrchestrator, PhaseOutcome, RunContext};
use resolver_common::Result;

use super::statistics::PhaseStats;

#[derive(Debug, sqlx::FromRow)]
struct PerformerSync {
    id: i64,
    release_count: i64,
    latest_release_date: Option<String>,
    computed_count: i64,
    computed_latest: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductSync {
    id: i64,
    performer_count: i64,
    has_video: i64,
    on_sale: i64,
    min_price: Option<i64>,
    best_rating: Option<f64>,
    review_total: i64,
    computed_performers: i64,
    computed_has_video: i64,
    computed_on_sale: i64,
    computed_min_price: Option<i64>,
    computed_best_rating: Option<f64>,
    computed_reviews: i64,
}

impl BatchOrchestrator {
    pub(super) async fn phase_resync(&self, ctx: &mut RunContext) -> Result<PhaseOutcome> {
        let mut stats = PhaseStats::default();

        let scoped = !ctx.touched.performers.is_empty() || !ctx.touched.products.is_empty();
        tracing::info!(
            scoped,
            touched_performers = ctx.touched.performers.len(),
            touched_products = ctx.touched.products.len(),
            "Phase stat_resync: recomputing aggregates"
        );

        self.resync_performers(ctx, &mut stats).await?;
        if !ctx.over_budget() {
            self.resync_products(ctx, &mut stats).await?;
        }

        if ctx.over_budget() {
            return Ok(PhaseOutcome::aborted(stats));
        }
        Ok(PhaseOutcome::completed(stats))
    }

    async fn resync_performers(&self, ctx: &mut RunContext, stats: &mut PhaseStats) -> Result<()> {
        let scoped = !ctx.touched.performers.is_empty();
        let base = r#"
            SELECT p.id, p.release_count, p.latest_release_date,
                   COUNT(DISTINCT pp.product_id) AS computed_count,
                   MAX(ps.release_date) AS computed_latest
            FROM performers p
            LEFT JOIN product_performers pp ON pp.performer_id = p.id
            LEFT JOIN product_sources ps ON ps.product_id = pp.product_id
        "#;

        let rows: Vec<PerformerSync> = if scoped {
            let ids: Vec<i64> = ctx.touched.performers.iter().copied().collect();
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "{base} WHERE p.id IN ({placeholders}) GROUP BY p.id ORDER BY p.id LIMIT ?"
            );
            let mut query = sqlx::query_as(&sql);
            for id in &ids {
                query = query.bind(id);
            }
            query.bind(ctx.limit).fetch_all(&self.db).await?
        } else {
            let sql = format!("{base} GROUP BY p.id ORDER BY p.id LIMIT ?");
            sqlx::query_as(&sql).bind(ctx.limit).fetch_all(&self.db).await?
        };

        for row in rows {
            if ctx.over_budget() {
                return Ok(());
            }
            stats.processed += 1;

            if row.release_count == row.computed_count
                && row.latest_release_date == row.computed_latest
            {
                stats.skipped += 1;
                continue;
            }

            if ctx.dry_run {
                stats.merged += 1;
                continue;
            }

            sqlx::query(
                "UPDATE performers SET release_count = ?, latest_release_date = ? WHERE id = ?",
            )
            .bind(row.computed_count)
            .bind(&row.computed_latest)
            .bind(row.id)
            .execute(&self.db)
            .await?;
            stats.merged += 1;
        }

        Ok(())
    }

    async fn resync_products(&self, ctx: &mut RunContext, stats: &mut PhaseStats) -> Result<()> {
        let scoped = !ctx.touched.products.is_empty();
        let base = r#"
            SELECT pr.id, pr.performer_count, pr.has_video, pr.on_sale,
                   pr.min_price, pr.best_rating, pr.review_total,
                   (SELECT COUNT(*) FROM product_performers pp
                    WHERE pp.product_id = pr.id) AS computed_performers,
                   COALESCE(MAX(ps.has_video), 0) AS computed_has_video,
                   COALESCE(MAX(ps.on_sale), 0) AS computed_on_sale,
                   MIN(ps.price) AS computed_min_price,
                   MAX(ps.rating) AS computed_best_rating,
                   COALESCE(SUM(ps.review_count), 0) AS computed_reviews
            FROM products pr
            LEFT JOIN product_sources ps ON ps.product_id = pr.id
        "#;

        let rows: Vec<ProductSync> = if scoped {
            let ids: Vec<i64> = ctx.touched.products.iter().copied().collect();
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "{base} WHERE pr.id IN ({placeholders}) GROUP BY pr.id ORDER BY pr.id LIMIT ?"
            );
            let mut query = sqlx::query_as(&sql);
            for id in &ids {
                query = query.bind(id);
            }
            query.bind(ctx.limit).fetch_all(&self.db).await?
        } else {
            let sql = format!("{base} GROUP BY pr.id ORDER BY pr.id LIMIT ?");
            sqlx::query_as(&sql).bind(ctx.limit).fetch_all(&self.db).await?
        };

        for row in rows {
            if ctx.over_budget() {
                return Ok(());
            }
            stats.processed += 1;

            let unchanged = row.performer_count == row.computed_performers
                && row.has_video == row.computed_has_video
                && row.on_sale == row.computed_on_sale
                && row.min_price == row.computed_min_price
                && row.best_rating == row.computed_best_rating
                && row.review_total == row.computed_reviews;
            if unchanged {
                stats.skipped += 1;
                continue;
            }

            if ctx.dry_run {
                stats.merged += 1;
                continue;
            }

            sqlx::query(
                r#"
                UPDATE products
                SET performer_count = ?, has_video = ?, on_sale = ?,
                    min_price = ?, best_rating = ?, review_total = ?
                WHERE id = ?
                "#,
            )
            .bind(row.computed_performers)
            .bind(row.computed_has_video)
            .bind(row.computed_on_sale)
            .bind(row.computed_min_price)
            .bind(row.computed_best_rating)
            .bind(row.computed_reviews)
            .bind(row.id)
            .execute(&self.db)
            .await?;
            stats.merged += 1;
        }

        Ok(())
    }
}
