//! resolver-engine library interface
//!
//! Exposes the matchers, group manager and pipeline for integration
//! testing, plus the router for the HTTP trigger surface.

pub mod api;
pub mod db;
pub mod error;
pub mod groups;
pub mod matching;
pub mod normalize;
pub mod performers;
pub mod pipeline;
pub mod resolver;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use resolver_common::Config;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api::batch::RunEntry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Immutable configuration loaded at startup
    pub config: Config,
    /// Registry of batch runs, live and finished, for status queries
    pub runs: Arc<RwLock<HashMap<Uuid, RunEntry>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last batch-run error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        Self {
            db,
            config,
            runs: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::batch_routes())
        .merge(api::resolve_routes())
        .merge(api::health_routes())
        .with_state(state)
}
