//! Typed row models
//!
//! Every query result crossing the storage boundary is an explicit struct.
//! Raw untyped rows never leave the db layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One source's view of a product. Created by ingestion; read-only to the
/// resolution engine.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CandidateRecord {
    pub id: i64,
    pub product_id: i64,
    pub normalized_id: String,
    pub maker_code: Option<String>,
    pub title: String,
    pub normalized_title: String,
    pub release_date: Option<NaiveDate>,
    pub duration_minutes: Option<i64>,
    pub source: String,
    pub image_count: i64,
    pub review_count: i64,
    /// JSON array of free-text performer names as supplied by the source
    pub performer_names: String,
    pub created_at: DateTime<Utc>,
}

impl CandidateRecord {
    /// Decode the performer-name list. Malformed JSON yields an empty
    /// list rather than an error; a record without usable names simply
    /// contributes no performer evidence.
    pub fn performer_list(&self) -> Vec<String> {
        serde_json::from_str(&self.performer_names).unwrap_or_default()
    }
}

/// Group summary returned by single-record lookups
#[derive(Debug, Clone, Serialize)]
pub struct GroupInfo {
    pub group_id: i64,
    pub master_record_id: Option<i64>,
    pub canonical_code: Option<String>,
    pub member_count: i64,
}

/// Canonical person entity
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Performer {
    pub id: i64,
    pub name: String,
    pub release_count: i64,
    pub latest_release_date: Option<NaiveDate>,
    pub debut_year: Option<i64>,
}

