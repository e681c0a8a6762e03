/// Database Models
///
/// SQL models for audit-trail persistence. These tables are additive
/// history: restart MUST NOT depend on reading any of them back.
use chrono::{DateTime, Utc};
use sqlx::FromRow;

// ============================================================================
// ALERT MODELS
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct AlertRecord {
    pub id: Option<i64>,
    pub alert_id: String,
    pub rule_id: String,
    pub timestamp: String,
    pub severity: String,
    pub status: String,
    pub source_metric: String,
    pub source_value: f64,
    pub effective_threshold: f64,
    pub correlation_group: String,
    pub message: String,
}

impl AlertRecord {
    pub fn new(
        alert_id: String,
        rule_id: String,
        timestamp: DateTime<Utc>,
        severity: String,
        status: String,
        source_metric: String,
        source_value: f64,
        effective_threshold: f64,
        correlation_group: String,
        message: String,
    ) -> Self {
        Self {
            id: None,
            alert_id,
            rule_id,
            timestamp: timestamp.to_rfc3339(),
            severity,
            status,
            source_metric,
            source_value,
            effective_threshold,
            correlation_group,
            message,
        }
    }
}

// ============================================================================
// BACKUP MODELS
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct BackupOperationRecord {
    pub id: Option<i64>,
    pub operation_id: String,
    pub target_id: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub source_bytes: i64,
    pub backup_bytes: i64,
    pub file_count: i64,
    pub artifact_path: Option<String>,
    pub checksum: Option<String>,
    pub verified: Option<bool>,
    pub error: Option<String>,
}

impl BackupOperationRecord {
    pub fn new(operation_id: String, target_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            operation_id,
            target_id,
            status: "pending".to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: None,
            source_bytes: 0,
            backup_bytes: 0,
            file_count: 0,
            artifact_path: None,
            checksum: None,
            verified: None,
            error: None,
        }
    }
}

// ============================================================================
// FEDERATION MODELS
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct FederationNodeRecord {
    pub id: Option<i64>,
    pub node_id: String,
    pub node_type: String,
    pub status: String,
    pub endpoint: String,
    pub last_seen: Option<String>,
    pub priority: i64,
}

impl FederationNodeRecord {
    pub fn new(node_id: String, node_type: String, endpoint: String, priority: i64) -> Self {
        Self {
            id: None,
            node_id,
            node_type,
            status: "unknown".to_string(),
            endpoint,
            last_seen: None,
            priority,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GlobalMetricRecord {
    pub id: Option<i64>,
    pub metric_name: String,
    pub timestamp: String,
    pub value: f64,
    pub method: String,
    pub confidence: f64,
    pub contributing_nodes: String,
}

impl GlobalMetricRecord {
    pub fn new(
        metric_name: String,
        timestamp: DateTime<Utc>,
        value: f64,
        method: String,
        confidence: f64,
        contributing_nodes: String,
    ) -> Self {
        Self {
            id: None,
            metric_name,
            timestamp: timestamp.to_rfc3339(),
            value,
            method,
            confidence,
            contributing_nodes,
        }
    }
}

// ============================================================================
// SERVICE HEALTH MODELS
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ServiceHealthRecord {
    pub id: Option<i64>,
    pub service_name: String,
    pub timestamp: String,
    pub status: String,
    pub restart_count: i64,
    pub recovery_attempts: i64,
}

impl ServiceHealthRecord {
    pub fn new(
        service_name: String,
        timestamp: DateTime<Utc>,
        status: String,
        restart_count: i64,
        recovery_attempts: i64,
    ) -> Self {
        Self {
            id: None,
            service_name,
            timestamp: timestamp.to_rfc3339(),
            status,
            restart_count,
            recovery_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_record_creation() {
        let now = Utc::now();
        let record = AlertRecord::new(
            "alert-1".to_string(),
            "high_cpu_usage".to_string(),
            now,
            "high".to_string(),
            "active".to_string(),
            "cpu_usage_percent".to_string(),
            95.0,
            90.0,
            "corr-1".to_string(),
            "CPU breach".to_string(),
        );
        assert_eq!(record.rule_id, "high_cpu_usage");
        assert_eq!(record.source_value, 95.0);
    }

    #[test]
    fn test_backup_operation_record_creation() {
        let now = Utc::now();
        let record = BackupOperationRecord::new("bkp-1".to_string(), "tsdb_data".to_string(), now);
        assert_eq!(record.status, "pending");
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn test_federation_node_record_creation() {
        let record = FederationNodeRecord::new(
            "node-a".to_string(),
            "primary".to_string(),
            "https://node-a.internal".to_string(),
            1,
        );
        assert_eq!(record.status, "unknown");
    }
}
