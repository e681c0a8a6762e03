/// API Request/Response Models
///
/// Data structures for HTTP requests and responses.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// ALERTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDto {
    pub id: String,
    pub rule_id: String,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub source_metric: String,
    pub source_value: f64,
    pub effective_threshold: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub correlation_group: String,
    pub escalation_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub active: Vec<AlertDto>,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcknowledgeAlertRequest {
    pub rule_id: String,
    pub host: String,
}

// ============================================================================
// SERVICE HEALTH
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealthDto {
    pub name: String,
    pub status: String,
    pub last_check: DateTime<Utc>,
    pub issues: Vec<String>,
    pub recovery_attempts: u32,
    pub restart_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealthResponse {
    pub services: Vec<ServiceHealthDto>,
}

// ============================================================================
// BACKUPS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOperationDto {
    pub id: String,
    pub target_id: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub source_bytes: u64,
    pub backup_bytes: u64,
    pub file_count: u64,
    pub artifact_path: Option<String>,
    pub verified: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupTargetDto {
    pub id: String,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupHistoryResponse {
    pub target_id: String,
    pub operations: Vec<BackupOperationDto>,
}

// ============================================================================
// FEDERATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationNodeDto {
    pub id: String,
    pub node_type: String,
    pub status: String,
    pub endpoint: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub uptime_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationNodesResponse {
    pub nodes: Vec<FederationNodeDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalMetricDto {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub contributing_nodes: Vec<String>,
    pub method: String,
    pub confidence: f64,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalMetricsResponse {
    pub metrics: Vec<GlobalMetricDto>,
}

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub active_alerts: usize,
    pub services_monitored: usize,
    pub federation_nodes: usize,
}

// ============================================================================
// WEBSOCKET MESSAGES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Notification { subject: String, body: String, severity: String, fields: HashMap<String, String> },
    Ping,
    Pong,
}

// ============================================================================
// ERROR RESPONSES
// ============================================================================

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    /// Create new error response
    pub fn new(error: String, message: String) -> Self {
        Self {
            error,
            message,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// SUCCESS RESPONSES
// ============================================================================

/// Success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> SuccessResponse<T> {
    /// Create new success response
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_stamps_timestamp() {
        let error = ErrorResponse::new("NOT_FOUND".to_string(), "alert not found".to_string());
        assert_eq!(error.error, "NOT_FOUND");
    }

    #[test]
    fn success_response_wraps_data() {
        let response = SuccessResponse::new(vec![1, 2, 3]);
        assert!(response.success);
        assert_eq!(response.data.len(), 3);
    }
}
