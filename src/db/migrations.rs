//! Database migrations and initialization.

use super::Database;
use crate::config::Config;
use crate::error::StoreError;
use sqlx::sqlite::SqlitePool;
use tracing::info;

/// Open the store described by `config`, apply pragmas and run migrations.
pub async fn init_db(config: &Config) -> Result<Database, StoreError> {
    let db = Database::initialize(&config.database_path, config.pragmas).await?;

    run_migrations(db.pool()).await?;

    info!(
        "Database initialized successfully at {}",
        config.database_path.display()
    );
    Ok(db)
}

/// Run all database migrations. Every statement is idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");
    let schema_sql = include_str!("schema.sql");

    for statement in schema_sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    info!("Migrations completed successfully");
    Ok(())
}
