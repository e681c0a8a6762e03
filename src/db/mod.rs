/// Database Module
///
/// Connection management and audit-trail schema. The TSDB-style tables
/// (`metric_points`, `federation_node_health`, ...) are bootstrapped by
/// their owning collaborator (`platform::sink::SqliteSink`); this module
/// owns the relational audit tables shared across orchestrators.
pub mod models;
pub mod queries;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:sentinel-orch.db".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: 30,
        }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(default.database_url),
            max_connections: crate::platform::config::env_var("DB_MAX_CONNECTIONS", default.max_connections),
            min_connections: crate::platform::config::env_var("DB_MIN_CONNECTIONS", default.min_connections),
            connect_timeout: crate::platform::config::env_var("DB_CONNECT_TIMEOUT", default.connect_timeout),
        }
    }
}

/// Opens the pool, creating the database file if missing, and applies the
/// `api_keys`/`rate_limit_log` migration set.
pub async fn init_pool(config: DbConfig) -> Result<SqlitePool, sqlx::Error> {
    info!("initializing database: {}", config.database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .connect_with(
            config
                .database_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()?
                .create_if_missing(true),
        )
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("database initialized successfully");
    Ok(pool)
}

/// Creates the audit tables for alerts, backup operations, federation
/// nodes/metrics, and service health, owned directly by this module
/// rather than by a migration (mirroring the existing `create_schema`
/// convention for tables that don't need versioned evolution).
pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("creating database schema");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_id TEXT NOT NULL,
            rule_id TEXT NOT NULL,
            timestamp DATETIME NOT NULL,
            severity TEXT NOT NULL,
            status TEXT NOT NULL,
            source_metric TEXT NOT NULL,
            source_value REAL NOT NULL,
            effective_threshold REAL NOT NULL,
            correlation_group TEXT NOT NULL,
            message TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS backup_operations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at DATETIME NOT NULL,
            finished_at DATETIME,
            source_bytes INTEGER NOT NULL DEFAULT 0,
            backup_bytes INTEGER NOT NULL DEFAULT 0,
            file_count INTEGER NOT NULL DEFAULT 0,
            artifact_path TEXT,
            checksum TEXT,
            verified BOOLEAN,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS backup_targets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            target_id TEXT NOT NULL UNIQUE,
            source_paths TEXT NOT NULL,
            backup_type TEXT NOT NULL,
            retention_policy TEXT NOT NULL,
            priority INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS federation_nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL UNIQUE,
            node_type TEXT NOT NULL,
            status TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            last_seen DATETIME,
            priority INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS global_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            metric_name TEXT NOT NULL,
            timestamp DATETIME NOT NULL,
            value REAL NOT NULL,
            method TEXT NOT NULL,
            confidence REAL NOT NULL,
            contributing_nodes TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS service_health (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_name TEXT NOT NULL,
            timestamp DATETIME NOT NULL,
            status TEXT NOT NULL,
            restart_count INTEGER NOT NULL DEFAULT 0,
            recovery_attempts INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("schema created successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_default() {
        let config = DbConfig::default();
        assert!(!config.database_url.is_empty());
        assert!(config.max_connections > 0);
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();
    }
}
