mod api;
mod config;
mod db;
mod error;
mod logging;

use crate::config::Config;
use anyhow::Result;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    let _log_guard = logging::init_logging(&config.logging)?;

    info!("Starting townsquare...");
    info!("Logs are written to: {}", config.logging.dir);

    let db = db::establish_connection(&config.database).await?;
    info!("✅ Database connection established");

    if config.database.run_migrations {
        migration::Migrator::up(&db, None).await?;
        info!("✅ Database migrations completed");
    }

    let repo = Arc::new(db::repo::Repo::new(db));
    repo.ping().await?;
    info!("✅ Database ping successful");

    let handler = api::ApiHandler::new(repo, config.database.query_timeout());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    api::server::serve(handler, &addr).await?;

    info!("✅ Shutdown complete");
    Ok(())
}
