/// Database Queries
///
/// SQL query functions for audit-trail persistence and retrieval.
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::*;

// ============================================================================
// ALERT QUERIES
// ============================================================================

pub async fn store_alert(pool: &SqlitePool, record: &AlertRecord) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO alerts
        (alert_id, rule_id, timestamp, severity, status, source_metric, source_value, effective_threshold, correlation_group, message)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.alert_id)
    .bind(&record.rule_id)
    .bind(&record.timestamp)
    .bind(&record.severity)
    .bind(&record.status)
    .bind(&record.source_metric)
    .bind(record.source_value)
    .bind(record.effective_threshold)
    .bind(&record.correlation_group)
    .bind(&record.message)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn recent_alerts(pool: &SqlitePool, limit: i64) -> Result<Vec<AlertRecord>, sqlx::Error> {
    sqlx::query_as::<_, AlertRecord>(
        "SELECT * FROM alerts ORDER BY timestamp DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ============================================================================
// BACKUP QUERIES
// ============================================================================

pub async fn store_backup_operation(
    pool: &SqlitePool,
    record: &BackupOperationRecord,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO backup_operations
        (operation_id, target_id, status, started_at, finished_at, source_bytes, backup_bytes, file_count, artifact_path, checksum, verified, error)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.operation_id)
    .bind(&record.target_id)
    .bind(&record.status)
    .bind(&record.started_at)
    .bind(&record.finished_at)
    .bind(record.source_bytes)
    .bind(record.backup_bytes)
    .bind(record.file_count)
    .bind(&record.artifact_path)
    .bind(&record.checksum)
    .bind(record.verified)
    .bind(&record.error)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn recent_backup_operations(
    pool: &SqlitePool,
    target_id: &str,
    limit: i64,
) -> Result<Vec<BackupOperationRecord>, sqlx::Error> {
    sqlx::query_as::<_, BackupOperationRecord>(
        "SELECT * FROM backup_operations WHERE target_id = ? ORDER BY started_at DESC LIMIT ?",
    )
    .bind(target_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ============================================================================
// FEDERATION QUERIES
// ============================================================================

pub async fn upsert_federation_node(
    pool: &SqlitePool,
    record: &FederationNodeRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO federation_nodes (node_id, node_type, status, endpoint, last_seen, priority)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(node_id) DO UPDATE SET
            status = excluded.status,
            last_seen = excluded.last_seen
        "#,
    )
    .bind(&record.node_id)
    .bind(&record.node_type)
    .bind(&record.status)
    .bind(&record.endpoint)
    .bind(&record.last_seen)
    .bind(record.priority)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn store_global_metric(
    pool: &SqlitePool,
    record: &GlobalMetricRecord,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO global_metrics
        (metric_name, timestamp, value, method, confidence, contributing_nodes)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.metric_name)
    .bind(&record.timestamp)
    .bind(record.value)
    .bind(&record.method)
    .bind(record.confidence)
    .bind(&record.contributing_nodes)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

// ============================================================================
// SERVICE HEALTH QUERIES
// ============================================================================

pub async fn store_service_health(
    pool: &SqlitePool,
    record: &ServiceHealthRecord,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO service_health
        (service_name, timestamp, status, restart_count, recovery_attempts)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.service_name)
    .bind(&record.timestamp)
    .bind(&record.status)
    .bind(record.restart_count)
    .bind(record.recovery_attempts)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn latest_service_health(
    pool: &SqlitePool,
    service_name: &str,
) -> Result<Option<ServiceHealthRecord>, sqlx::Error> {
    sqlx::query_as::<_, ServiceHealthRecord>(
        "SELECT * FROM service_health WHERE service_name = ? ORDER BY timestamp DESC LIMIT 1",
    )
    .bind(service_name)
    .fetch_optional(pool)
    .await
}

/// Prunes audit rows older than `retention`, run by the maintenance cycle's
/// log/backup cleanup tasks.
pub async fn prune_old_alerts(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM alerts WHERE timestamp < ?")
        .bind(cutoff.to_rfc3339())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
