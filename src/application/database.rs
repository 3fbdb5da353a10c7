use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

use crate::application::config::CONFIG;
use crate::application::error::{AppError, Result};
use crate::migrations::Migrator;

pub type DbConn = DatabaseConnection;

/// Create the database connection pool and run migrations
pub async fn connect() -> Result<DbConn> {
    let db_config = &CONFIG.database;

    let mut opts = ConnectOptions::new(&db_config.database_url);
    opts.max_connections(db_config.max_connections + db_config.max_overflow)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(db_config.connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(db_config.statement_timeout_secs))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    let db = Database::connect(opts)
        .await
        .map_err(|e| AppError::internal(format!("failed to connect to database: {e}")))?;

    tracing::info!("Running database migrations...");
    Migrator::up(&db, None)
        .await
        .map_err(|e| AppError::internal(format!("failed to run migrations: {e}")))?;
    tracing::info!("Database migrations completed");

    Ok(db)
}
