/// API Endpoint Handlers
///
/// HTTP request handlers for all API endpoints.
use actix_web::{web, HttpResponse, Result as ActixResult};
use chrono::Utc;

use super::models::*;
use super::AppState;

fn alert_dto(alert: &crate::alerting::Alert) -> AlertDto {
    AlertDto {
        id: alert.id.clone(),
        rule_id: alert.rule_id.clone(),
        title: alert.title.clone(),
        description: alert.description.clone(),
        severity: format!("{:?}", alert.severity),
        status: format!("{:?}", alert.status),
        source_metric: alert.source_metric.clone(),
        source_value: alert.source_value,
        effective_threshold: alert.effective_threshold,
        first_seen: alert.first_seen,
        last_seen: alert.last_seen,
        correlation_group: alert.correlation_group.clone(),
        escalation_level: alert.escalation_level,
    }
}

// ============================================================================
// ALERT ENDPOINTS
// ============================================================================

/// GET /api/v1/alerts - Active alerts
pub async fn get_alerts(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let active: Vec<AlertDto> = state
        .alerting
        .active_alerts_snapshot()
        .await
        .iter()
        .map(alert_dto)
        .collect();

    let response = AlertsResponse {
        count: active.len(),
        active,
    };

    Ok(HttpResponse::Ok().json(SuccessResponse::new(response)))
}

/// POST /api/v1/alerts/acknowledge - Acknowledge an active alert
pub async fn acknowledge_alert(
    state: web::Data<AppState>,
    body: web::Json<AcknowledgeAlertRequest>,
) -> ActixResult<HttpResponse> {
    state.alerting.acknowledge(&body.rule_id, &body.host).await;
    Ok(HttpResponse::Ok().json(SuccessResponse::new(serde_json::json!({"acknowledged": true}))))
}

// ============================================================================
// SERVICE HEALTH ENDPOINTS
// ============================================================================

/// GET /api/v1/health/services - Self-healing orchestrator snapshot
pub async fn get_service_health(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let services: Vec<ServiceHealthDto> = state
        .healing
        .health_snapshot()
        .await
        .into_iter()
        .map(|record| ServiceHealthDto {
            name: record.name,
            status: format!("{:?}", record.status),
            last_check: record.last_check,
            issues: record.issues,
            recovery_attempts: record.recovery_attempts,
            restart_count: record.restart_count,
        })
        .collect();

    Ok(HttpResponse::Ok().json(SuccessResponse::new(ServiceHealthResponse { services })))
}

// ============================================================================
// BACKUP ENDPOINTS
// ============================================================================

/// GET /api/v1/backups/targets - Configured backup targets
pub async fn get_backup_targets(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let targets: Vec<BackupTargetDto> = state
        .backup
        .targets()
        .iter()
        .map(|t| BackupTargetDto {
            id: t.id.clone(),
            priority: t.priority,
        })
        .collect();

    Ok(HttpResponse::Ok().json(SuccessResponse::new(targets)))
}

/// GET /api/v1/backups/{target_id}/history - Backup operation history for a target
pub async fn get_backup_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let target_id = path.into_inner();
    let operations: Vec<BackupOperationDto> = state
        .backup
        .history_snapshot(&target_id)
        .await
        .into_iter()
        .map(|op| BackupOperationDto {
            id: op.id,
            target_id: op.target_id,
            status: format!("{:?}", op.status),
            started_at: op.started_at,
            finished_at: op.finished_at,
            source_bytes: op.source_bytes,
            backup_bytes: op.backup_bytes,
            file_count: op.file_count,
            artifact_path: op.artifact_path.map(|p| p.display().to_string()),
            verified: op.verified.unwrap_or(false),
            error: op.error,
        })
        .collect();

    Ok(HttpResponse::Ok().json(SuccessResponse::new(BackupHistoryResponse {
        target_id,
        operations,
    })))
}

// ============================================================================
// FEDERATION ENDPOINTS
// ============================================================================

/// GET /api/v1/federation/nodes - Federation node snapshot with uptime
pub async fn get_federation_nodes(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let snapshot = state.federation.node_snapshot().await;
    let mut nodes = Vec::with_capacity(snapshot.len());
    for node in snapshot {
        let uptime_percent = state.federation.node_uptime_percent(&node.id).await;
        nodes.push(FederationNodeDto {
            id: node.id,
            node_type: format!("{:?}", node.node_type),
            status: format!("{:?}", node.status),
            endpoint: node.endpoint,
            last_seen: node.last_seen,
            uptime_percent,
        });
    }

    Ok(HttpResponse::Ok().json(SuccessResponse::new(FederationNodesResponse { nodes })))
}

/// GET /api/v1/federation/metrics - Latest cross-node aggregated metrics
pub async fn get_global_metrics(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let metrics: Vec<GlobalMetricDto> = state
        .federation
        .aggregate_metrics()
        .await
        .into_iter()
        .map(|m| GlobalMetricDto {
            name: m.name,
            value: m.value,
            timestamp: m.timestamp,
            contributing_nodes: m.contributing_nodes,
            method: format!("{:?}", m.method),
            confidence: m.confidence,
            labels: m.labels,
        })
        .collect();

    Ok(HttpResponse::Ok().json(SuccessResponse::new(GlobalMetricsResponse { metrics })))
}

// ============================================================================
// SYSTEM ENDPOINTS
// ============================================================================

/// GET /api/v1/health - Liveness probe
pub async fn health_check() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(SuccessResponse::new(serde_json::json!({"status": "healthy"}))))
}

/// GET /api/v1/status - Aggregate system status across every orchestrator
pub async fn get_status(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let active_alerts = state.alerting.active_alerts_snapshot().await.len();
    let services_monitored = state.healing.health_snapshot().await.len();
    let federation_nodes = state.federation.node_snapshot().await.len();
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds()
        .max(0) as u64;

    Ok(HttpResponse::Ok().json(SuccessResponse::new(StatusResponse {
        status: "running".to_string(),
        uptime_seconds,
        active_alerts,
        services_monitored,
        federation_nodes,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let error = ErrorResponse::new("TEST".to_string(), "Test message".to_string());
        assert_eq!(error.error, "TEST");
        assert_eq!(error.message, "Test message");
    }
}
