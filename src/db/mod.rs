//! Database module
pub mod entities;
pub mod repo;

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

pub async fn establish_connection(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(config.url.as_str());
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(config.query_timeout())
        .idle_timeout(Duration::from_secs(60))
        .sqlx_logging(false);

    let connection = Database::connect(opt)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to {:?} database", connection.get_database_backend());

    Ok(connection)
}
