//! Engine-side record queries
//!
//! Thin typed helpers over the shared schema. Anything returning rows
//! maps them to the models in `resolver-common` before they leave this
//! module.

use resolver_common::db::models::CandidateRecord;
use resolver_common::Result;
use sqlx::SqlitePool;

const RECORD_COLUMNS: &str = "id, product_id, normalized_id, maker_code, title, normalized_title,
     release_date, duration_minutes, source, image_count, review_count, performer_names, created_at";

/// Fetch one candidate record by id
pub async fn fetch_record(db: &SqlitePool, record_id: i64) -> Result<Option<CandidateRecord>> {
    let record = sqlx::query_as(&format!(
        "SELECT {RECORD_COLUMNS} FROM product_sources WHERE id = ?"
    ))
    .bind(record_id)
    .fetch_optional(db)
    .await?;
    Ok(record)
}

/// Fetch records that are not yet members of any identity group,
/// optionally restricted to a set of sources, in insertion order.
pub async fn fetch_ungrouped(
    db: &SqlitePool,
    target_sources: Option<&[String]>,
    limit: i64,
) -> Result<Vec<CandidateRecord>> {
    let records = match target_sources {
        Some(sources) if !sources.is_empty() => {
            // Bounded IN-list built from bind placeholders
            let placeholders = vec!["?"; sources.len()].join(", ");
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM product_sources ps
                 WHERE NOT EXISTS (
                     SELECT 1 FROM identity_group_members m WHERE m.record_id = ps.id
                 ) AND ps.source IN ({placeholders})
                 ORDER BY ps.id LIMIT ?"
            );
            let mut query = sqlx::query_as(&sql);
            for source in sources {
                query = query.bind(source);
            }
            query.bind(limit).fetch_all(db).await?
        }
        _ => {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM product_sources ps
                 WHERE NOT EXISTS (
                     SELECT 1 FROM identity_group_members m WHERE m.record_id = ps.id
                 )
                 ORDER BY ps.id LIMIT ?"
            );
            sqlx::query_as(&sql).bind(limit).fetch_all(db).await?
        }
    };
    Ok(records)
}

/// Records whose product has no performer links yet, in insertion order
pub async fn fetch_unlinked_records(db: &SqlitePool, limit: i64) -> Result<Vec<CandidateRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM product_sources ps
         WHERE NOT EXISTS (
             SELECT 1 FROM product_performers pp WHERE pp.product_id = ps.product_id
         )
         ORDER BY ps.id LIMIT ?"
    );
    let records = sqlx::query_as(&sql).bind(limit).fetch_all(db).await?;
    Ok(records)
}

/// Count of records already holding a group membership. Incremental runs
/// derive their starting point from this instead of external checkpoints.
pub async fn count_grouped(db: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM identity_group_members")
        .fetch_one(db)
        .await?;
    Ok(count)
}
