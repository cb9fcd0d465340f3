//! Performer store
//!
//! Canonical person entities, their aliases and product links, and the
//! transactional merge used by the dedup phases. A merge is atomic: a
//! partial application (links moved but row not deleted) is never
//! observable to concurrent readers.

use resolver_common::db::models::Performer;
use resolver_common::Result;
use sqlx::SqlitePool;

pub struct PerformerStore {
    db: SqlitePool,
}

impl PerformerStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a performer by display name, returning the existing id on
    /// conflict. Idempotent.
    pub async fn upsert(&self, name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO performers (name) VALUES (?)
            ON CONFLICT(name) DO UPDATE SET name = excluded.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.db)
        .await?;
        Ok(id)
    }

    pub async fn fetch(&self, performer_id: i64) -> Result<Option<Performer>> {
        let performer = sqlx::query_as(
            "SELECT id, name, release_count, latest_release_date, debut_year
             FROM performers WHERE id = ?",
        )
        .bind(performer_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(performer)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Performer>> {
        let performer = sqlx::query_as(
            "SELECT id, name, release_count, latest_release_date, debut_year
             FROM performers WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(performer)
    }

    /// Link a performer to a product. Returns false when the pair already
    /// existed; a constraint hit means "already linked", never an error.
    pub async fn link(&self, product_id: i64, performer_id: i64) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO product_performers (product_id, performer_id) VALUES (?, ?)
             ON CONFLICT(product_id, performer_id) DO NOTHING",
        )
        .bind(product_id)
        .bind(performer_id)
        .execute(&self.db)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    /// Product ids linked to a performer
    pub async fn linked_products(&self, performer_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT product_id FROM product_performers WHERE performer_id = ? ORDER BY product_id",
        )
        .bind(performer_id)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    /// Aliases of a performer
    pub async fn aliases(&self, performer_id: i64) -> Result<Vec<String>> {
        let aliases = sqlx::query_scalar(
            "SELECT alias FROM performer_aliases WHERE performer_id = ? ORDER BY alias",
        )
        .bind(performer_id)
        .fetch_all(&self.db)
        .await?;
        Ok(aliases)
    }

    /// Merge the losing performer into the winning one.
    ///
    /// One transaction: move links skipping duplicate pairs, delete the
    /// remainder, record the loser's name as an alias of the winner, move
    /// the loser's aliases skipping duplicates, delete the loser row.
    ///
    /// Idempotent: merging a performer into itself is a no-op, and
    /// re-merging an already-deleted loser is a no-op. Returns whether a
    /// merge actually happened.
    pub async fn merge(&self, winner_id: i64, loser_id: i64) -> Result<bool> {
        if winner_id == loser_id {
            return Ok(false);
        }

        let mut tx = self.db.begin().await?;

        let loser_name: Option<String> =
            sqlx::query_scalar("SELECT name FROM performers WHERE id = ?")
                .bind(loser_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(loser_name) = loser_name else {
            // Already merged in a previous run
            return Ok(false);
        };

        // (a) Move links; pairs that would collide with the winner's
        // existing links are left behind for (b)
        sqlx::query("UPDATE OR IGNORE product_performers SET performer_id = ? WHERE performer_id = ?")
            .bind(winner_id)
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;

        // (b) Leftovers are already duplicated on the winner
        sqlx::query("DELETE FROM product_performers WHERE performer_id = ?")
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;

        // (c) The loser's display name becomes an alias of the winner
        sqlx::query(
            "INSERT INTO performer_aliases (performer_id, alias, provenance) VALUES (?, ?, 'merge')
             ON CONFLICT(performer_id, alias) DO NOTHING",
        )
        .bind(winner_id)
        .bind(&loser_name)
        .execute(&mut *tx)
        .await?;

        // (d) Move the loser's own aliases, skipping duplicates
        sqlx::query("UPDATE OR IGNORE performer_aliases SET performer_id = ? WHERE performer_id = ?")
            .bind(winner_id)
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM performer_aliases WHERE performer_id = ?")
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;

        // (e) Delete the loser row
        sqlx::query("DELETE FROM performers WHERE id = ?")
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(winner_id, loser_id, loser = %loser_name, "Merged performers");
        Ok(true)
    }
}
