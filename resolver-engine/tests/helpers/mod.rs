//! Shared test utilities
//!
//! In-memory database setup and seed helpers used by the integration
//! tests.

#![allow(dead_code)]

use resolver_common::db::init_memory_pool;
use resolver_common::Config;
use resolver_engine::normalize::normalize_title;
use sqlx::SqlitePool;

/// Fresh in-memory database with the full schema
pub async fn create_test_pool() -> SqlitePool {
    init_memory_pool().await.expect("in-memory pool")
}

/// Default configuration with the built-in source priority table
pub fn test_config() -> Config {
    Config::with_default_priorities()
}

/// One seedable source record; unspecified fields default to neutral
/// values
pub struct SeedRecord<'a> {
    pub normalized_id: &'a str,
    pub maker_code: Option<&'a str>,
    pub title: &'a str,
    pub release_date: Option<&'a str>,
    pub duration_minutes: Option<i64>,
    pub source: &'a str,
    pub image_count: i64,
    pub review_count: i64,
    pub performers: &'a [&'a str],
}

impl<'a> Default for SeedRecord<'a> {
    fn default() -> Self {
        Self {
            normalized_id: "",
            maker_code: None,
            title: "",
            release_date: None,
            duration_minutes: None,
            source: "dmm",
            image_count: 0,
            review_count: 0,
            performers: &[],
        }
    }
}

/// Insert a product and one source record for it. Returns
/// `(record_id, product_id)`.
pub async fn seed_record(pool: &SqlitePool, seed: SeedRecord<'_>) -> (i64, i64) {
    let product_id: i64 = sqlx::query_scalar(
        "INSERT INTO products (title, release_date, duration_minutes) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(seed.title)
    .bind(seed.release_date)
    .bind(seed.duration_minutes)
    .fetch_one(pool)
    .await
    .expect("insert product");

    let performer_names = serde_json::to_string(seed.performers).unwrap();
    let record_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO product_sources
            (product_id, normalized_id, maker_code, title, normalized_title,
             release_date, duration_minutes, source, image_count, review_count,
             performer_names)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(product_id)
    .bind(seed.normalized_id)
    .bind(seed.maker_code)
    .bind(seed.title)
    .bind(normalize_title(seed.title))
    .bind(seed.release_date)
    .bind(seed.duration_minutes)
    .bind(seed.source)
    .bind(seed.image_count)
    .bind(seed.review_count)
    .bind(&performer_names)
    .fetch_one(pool)
    .await
    .expect("insert product source");

    (record_id, product_id)
}

/// Insert one crawled lookup row keyed by normalized maker code
pub async fn seed_lookup(pool: &SqlitePool, maker_code: &str, source: &str, name: &str) {
    sqlx::query(
        "INSERT INTO source_name_lookup (maker_code, source, performer_name) VALUES (?, ?, ?)
         ON CONFLICT DO NOTHING",
    )
    .bind(maker_code)
    .bind(source)
    .bind(name)
    .execute(pool)
    .await
    .expect("insert lookup row");
}

/// Number of rows in a table
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count rows")
}

/// Group id holding a record, if any
pub async fn group_of(pool: &SqlitePool, record_id: i64) -> Option<i64> {
    sqlx::query_scalar("SELECT group_id FROM identity_group_members WHERE record_id = ?")
        .bind(record_id)
        .fetch_optional(pool)
        .await
        .expect("group lookup")
}
