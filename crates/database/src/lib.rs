//! Connection management and migrations for the Linkup SQLite database.

pub mod connection;
pub mod migrations;

pub use connection::prepare_database;
pub use migrations::run_migrations;

use linkup_config::DatabaseConfig;
use sqlx::SqlitePool;

/// Prepare the database and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let pool = prepare_database(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
