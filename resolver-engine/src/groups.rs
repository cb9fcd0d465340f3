//! Group manager
//!
//! Creates, extends, merges and splits canonical identity groups and
//! selects the representative ("master") record per group. Master
//! selection is a pure, re-runnable function of current group contents,
//! never incremental state, so it self-heals after any merge or removal.

use crate::matching::{MatchMethod, MatchResult};
use resolver_common::config::Config;
use resolver_common::db::models::{CandidateRecord, GroupInfo};
use resolver_common::{Error, Result};
use sqlx::SqlitePool;

/// Member row scored during master selection
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MasterCandidate {
    pub record_id: i64,
    pub source: String,
    pub image_count: i64,
    pub review_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Score one member: source priority plus capped image and review bonuses
fn master_score(candidate: &MasterCandidate, config: &Config) -> i64 {
    config.source_priority(&candidate.source)
        + (candidate.image_count * 2).min(20)
        + (candidate.review_count * 5).min(30)
}

/// Pick the master record from current members: highest score, ties
/// broken by earliest creation time, then lowest record id.
pub fn select_master(members: &[MasterCandidate], config: &Config) -> Option<i64> {
    members
        .iter()
        .max_by(|a, b| {
            master_score(a, config)
                .cmp(&master_score(b, config))
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.record_id.cmp(&a.record_id))
        })
        .map(|m| m.record_id)
}

pub struct GroupManager {
    db: SqlitePool,
    config: Config,
}

impl GroupManager {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        Self { db, config }
    }

    /// Create a new group seeded with one record. The canonical code is
    /// derived from the record and may be absent; that is never a failure.
    pub async fn create_group(&self, record: &CandidateRecord, method: MatchMethod) -> Result<i64> {
        let canonical_code = crate::matching::code_matcher::derive_normalized_code(record);

        let mut tx = self.db.begin().await?;

        let group_id: i64 = sqlx::query_scalar(
            "INSERT INTO identity_groups (master_record_id, canonical_code)
             VALUES (?, ?) RETURNING id",
        )
        .bind(record.id)
        .bind(&canonical_code)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO identity_group_members (group_id, record_id, confidence, method, source)
             VALUES (?, ?, 100, ?, ?)",
        )
        .bind(group_id)
        .bind(record.id)
        .bind(method.as_str())
        .bind(&record.source)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            group_id,
            record_id = record.id,
            code = canonical_code.as_deref().unwrap_or("-"),
            "Created identity group"
        );
        Ok(group_id)
    }

    /// Add a record to an existing group at the match's confidence and
    /// method. Idempotent: re-adding a member is a no-op.
    pub async fn add_to_group(
        &self,
        group_id: i64,
        record: &CandidateRecord,
        match_result: &MatchResult,
    ) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO identity_group_members (group_id, record_id, confidence, method, source)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(record_id) DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(record.id)
        .bind(match_result.confidence as i64)
        .bind(match_result.method.as_str())
        .bind(&record.source)
        .execute(&self.db)
        .await?
        .rows_affected();

        if inserted == 0 {
            tracing::debug!(group_id, record_id = record.id, "Record already grouped, no-op");
            return Ok(());
        }

        tracing::info!(
            group_id,
            record_id = record.id,
            confidence = match_result.confidence,
            method = match_result.method.as_str(),
            "Added record to group"
        );

        self.recompute_master(group_id).await
    }

    /// Single-record group lookup, used to short-circuit resolution for
    /// already-grouped records.
    pub async fn get_product_group(&self, record_id: i64) -> Result<Option<GroupInfo>> {
        let row: Option<(i64, Option<i64>, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT g.id, g.master_record_id, g.canonical_code,
                   (SELECT COUNT(*) FROM identity_group_members WHERE group_id = g.id)
            FROM identity_group_members m
            JOIN identity_groups g ON g.id = m.group_id
            WHERE m.record_id = ?
            "#,
        )
        .bind(record_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(group_id, master_record_id, canonical_code, member_count)| GroupInfo {
            group_id,
            master_record_id,
            canonical_code,
            member_count,
        }))
    }

    /// Merge the source group into the target group.
    ///
    /// Membership moves and source deletion run in one transaction so a
    /// crash mid-operation never leaves memberships pointing at a deleted
    /// group. Master recomputation runs after commit; it is a pure
    /// function of the surviving membership.
    pub async fn merge_groups(&self, target_id: i64, source_id: i64) -> Result<()> {
        if target_id == source_id {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;

        let target_code: Option<Option<String>> =
            sqlx::query_scalar("SELECT canonical_code FROM identity_groups WHERE id = ?")
                .bind(target_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(target_code) = target_code else {
            return Err(Error::NotFound(format!("identity group {target_id}")));
        };

        let source_code: Option<Option<String>> =
            sqlx::query_scalar("SELECT canonical_code FROM identity_groups WHERE id = ?")
                .bind(source_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(source_code) = source_code else {
            return Err(Error::NotFound(format!("identity group {source_id}")));
        };

        sqlx::query("UPDATE identity_group_members SET group_id = ? WHERE group_id = ?")
            .bind(target_id)
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        // Target adopts the source's canonical code when it has none
        if target_code.is_none() {
            if let Some(code) = source_code {
                sqlx::query("UPDATE identity_groups SET canonical_code = ? WHERE id = ?")
                    .bind(code)
                    .bind(target_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query("DELETE FROM identity_groups WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(target_id, source_id, "Merged identity groups");

        self.recompute_master(target_id).await
    }

    /// Remove a record's membership. An emptied group is deleted, never
    /// left dangling; otherwise the master is recomputed. Returns whether
    /// the record was grouped at all.
    pub async fn remove_from_group(&self, record_id: i64) -> Result<bool> {
        let group_id: Option<i64> =
            sqlx::query_scalar("SELECT group_id FROM identity_group_members WHERE record_id = ?")
                .bind(record_id)
                .fetch_optional(&self.db)
                .await?;

        let Some(group_id) = group_id else {
            return Ok(false);
        };

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM identity_group_members WHERE record_id = ?")
            .bind(record_id)
            .execute(&mut *tx)
            .await?;

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM identity_group_members WHERE group_id = ?")
                .bind(group_id)
                .fetch_one(&mut *tx)
                .await?;

        if remaining == 0 {
            sqlx::query("DELETE FROM identity_groups WHERE id = ?")
                .bind(group_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::info!(group_id, record_id, "Removed last member, deleted group");
            return Ok(true);
        }

        tx.commit().await?;
        tracing::info!(group_id, record_id, "Removed record from group");
        self.recompute_master(group_id).await?;
        Ok(true)
    }

    /// Recompute the group's master from current membership
    pub async fn recompute_master(&self, group_id: i64) -> Result<()> {
        let members: Vec<MasterCandidate> = sqlx::query_as(
            r#"
            SELECT m.record_id, ps.source, ps.image_count, ps.review_count, ps.created_at
            FROM identity_group_members m
            JOIN product_sources ps ON ps.id = m.record_id
            WHERE m.group_id = ?
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.db)
        .await?;

        let master = select_master(&members, &self.config);

        sqlx::query("UPDATE identity_groups SET master_record_id = ? WHERE id = ?")
            .bind(master)
            .bind(group_id)
            .execute(&self.db)
            .await?;

        tracing::debug!(group_id, master = ?master, "Recomputed group master");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candidate(record_id: i64, source: &str, images: i64, reviews: i64, ts: i64) -> MasterCandidate {
        MasterCandidate {
            record_id,
            source: source.to_string(),
            image_count: images,
            review_count: reviews,
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    #[test]
    fn master_prefers_source_priority() {
        let config = Config::with_default_priorities();
        let members = vec![
            candidate(1, "fc2", 10, 10, 100),
            candidate(2, "dmm", 0, 0, 200),
        ];
        // dmm: 100; fc2: 30 + 20 + 30 = 80
        assert_eq!(select_master(&members, &config), Some(2));
    }

    #[test]
    fn master_bonuses_are_capped() {
        let config = Config::with_default_priorities();
        let a = candidate(1, "duga", 1000, 1000, 100);
        assert_eq!(master_score(&a, &config), 60 + 20 + 30);
    }

    #[test]
    fn master_tie_breaks_by_earliest_creation() {
        let config = Config::with_default_priorities();
        let members = vec![
            candidate(5, "dmm", 0, 0, 300),
            candidate(9, "dmm", 0, 0, 100),
        ];
        assert_eq!(select_master(&members, &config), Some(9));
    }

    #[test]
    fn master_is_order_independent() {
        let config = Config::with_default_priorities();
        let mut members = vec![
            candidate(1, "duga", 3, 0, 50),
            candidate(2, "dmm", 0, 0, 80),
            candidate(3, "mgstage", 9, 2, 10),
        ];
        let first = select_master(&members, &config);
        members.reverse();
        assert_eq!(select_master(&members, &config), first);
        members.swap(0, 1);
        assert_eq!(select_master(&members, &config), first);
    }

    #[test]
    fn empty_membership_has_no_master() {
        let config = Config::with_default_priorities();
        assert_eq!(select_master(&[], &config), None);
    }
}
