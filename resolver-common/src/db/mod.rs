//! Database access for the resolution engine
//!
//! SQLite via sqlx. The schema is created at pool initialization with
//! `CREATE TABLE IF NOT EXISTS`, so a fresh database file is usable
//! immediately and re-initialization is a no-op.

pub mod models;

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool and schema
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// In-memory pool for tests and dry experiments. Capped at a single
/// connection: each `:memory:` connection is its own database, so a
/// wider pool would hand out empty databases.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create engine tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    // Canonical products with denormalized columns maintained by the
    // stat-resync phase
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            release_date TEXT,
            duration_minutes INTEGER,
            performer_count INTEGER NOT NULL DEFAULT 0,
            has_video INTEGER NOT NULL DEFAULT 0,
            on_sale INTEGER NOT NULL DEFAULT 0,
            min_price INTEGER,
            best_rating REAL,
            review_total INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One source's view of a product (the CandidateRecord read model)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS product_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL REFERENCES products(id),
            normalized_id TEXT NOT NULL UNIQUE,
            maker_code TEXT,
            title TEXT NOT NULL,
            normalized_title TEXT NOT NULL DEFAULT '',
            release_date TEXT,
            duration_minutes INTEGER,
            source TEXT NOT NULL,
            image_count INTEGER NOT NULL DEFAULT 0,
            review_count INTEGER NOT NULL DEFAULT 0,
            rating REAL,
            price INTEGER,
            has_video INTEGER NOT NULL DEFAULT 0,
            on_sale INTEGER NOT NULL DEFAULT 0,
            performer_names TEXT NOT NULL DEFAULT '[]',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_product_sources_maker_code
         ON product_sources(maker_code) WHERE maker_code IS NOT NULL",
    )
    .execute(pool)
    .await?;

    // Canonical identity clusters
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS identity_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            master_record_id INTEGER,
            canonical_code TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_identity_groups_code
         ON identity_groups(canonical_code) WHERE canonical_code IS NOT NULL",
    )
    .execute(pool)
    .await?;

    // Membership join table. The UNIQUE constraint on record_id enforces
    // single-group membership.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS identity_group_members (
            group_id INTEGER NOT NULL REFERENCES identity_groups(id),
            record_id INTEGER NOT NULL UNIQUE REFERENCES product_sources(id),
            confidence INTEGER NOT NULL,
            method TEXT NOT NULL,
            source TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Canonical person entities
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS performers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            release_count INTEGER NOT NULL DEFAULT 0,
            latest_release_date TEXT,
            debut_year INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS performer_aliases (
            performer_id INTEGER NOT NULL REFERENCES performers(id),
            alias TEXT NOT NULL,
            provenance TEXT NOT NULL DEFAULT 'merge',
            UNIQUE(performer_id, alias)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS product_performers (
            product_id INTEGER NOT NULL REFERENCES products(id),
            performer_id INTEGER NOT NULL REFERENCES performers(id),
            UNIQUE(product_id, performer_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Source-name-to-performer-names lookup, populated by an external
    // crawl. Read-only to the engine.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_name_lookup (
            maker_code TEXT NOT NULL,
            source TEXT NOT NULL,
            performer_name TEXT NOT NULL,
            UNIQUE(maker_code, source, performer_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized");

    Ok(())
}
