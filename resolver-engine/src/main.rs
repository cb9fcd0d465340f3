//! resolver-engine - Identity Resolution & Deduplication service
//!
//! Groups product records from multiple catalog sources into canonical
//! identity groups and deduplicates performer entities. Exposes an HTTP
//! trigger surface for batch runs and single-record resolution.

use anyhow::Result;
use resolver_common::{db::init_database_pool, Config};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use resolver_engine::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting resolver-engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Optional config file path as the first argument; falls back to
    // RESOLVER_CONFIG, then compiled defaults.
    let config_path: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::resolve(config_path.as_deref())?;

    let db_path = Path::new(&config.server.database_path);
    info!("Database: {}", db_path.display());
    let db_pool = init_database_pool(db_path).await?;
    info!("Database connection established");

    let bind = config.server.bind.clone();
    let state = AppState::new(db_pool, config);
    let app = resolver_engine::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on http://{bind}");
    info!("Health check: http://{bind}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
