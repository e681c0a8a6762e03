//! Application entry point for the sentinel-orch control plane.
//!
//! Wires the platform substrate (sink, notifier, secrets), the four
//! orchestrators (alerting, self-healing, backup, federation), the audit
//! database, and the ambient HTTP/WebSocket surface, then runs until a
//! shutdown signal is received.
//!
//! ## Environment Variables
//! - `API_HOST`, `API_PORT`, `API_WORKERS`, `API_REQUEST_TIMEOUT`
//! - `DATABASE_URL`, `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`, `DB_CONNECT_TIMEOUT`
//! - `CONTAINER_RUNTIME`: container CLI to shell out to (default "docker")
//! - `SLACK_WEBHOOK_URL`, `GENERIC_WEBHOOK_URL`: notification channel secrets
//! - `RUST_LOG`: tracing filter (overrides the `info` default)

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::signal;

use sentinel_orch::alerting::AlertOrchestrator;
use sentinel_orch::api::{self, AppState};
use sentinel_orch::backup::{self, BackupOrchestrator};
use sentinel_orch::db::{create_schema, init_pool, DbConfig};
use sentinel_orch::federation::{FederationNode, FederationOrchestrator, NodeType};
use sentinel_orch::healing::container::CliContainerCollaborator;
use sentinel_orch::healing::SelfHealingOrchestrator;
use sentinel_orch::platform::clock::RunningFlag;
use sentinel_orch::platform::notifier::{Channel, ChannelAdapter, DashboardAdapter, Notifier, RecordingAdapter, SlackAdapter, WebhookAdapter};
use sentinel_orch::platform::secrets::{read_secret, SecretsConfig};
use sentinel_orch::platform::sink::SqliteSink;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    tracing::info!("starting sentinel-orch control plane");

    let api_config = api::ApiConfig::from_env();
    let db_config = DbConfig::from_env();

    let db_pool = init_pool(db_config.clone())
        .await
        .expect("failed to initialize database pool");
    create_schema(&db_pool)
        .await
        .expect("failed to create database schema");
    let db_pool = Arc::new(db_pool);
    tracing::info!(url = %db_config.database_url, "database ready");

    let sink = SqliteSink::new((*db_pool).clone()).await;

    let secrets = SecretsConfig::default();
    let (dashboard_tx, _) = tokio::sync::broadcast::channel(256);
    let notifier = Arc::new(build_notifier(&secrets, dashboard_tx.clone()));

    let alerting = Arc::new(AlertOrchestrator::new(sink.clone(), notifier.clone()));
    alerting.load_default_rules().await;

    let container_runtime = std::env::var("CONTAINER_RUNTIME").unwrap_or_else(|_| "docker".to_string());
    let healing = Arc::new(SelfHealingOrchestrator::with_maintenance_config(
        Arc::new(CliContainerCollaborator::new(container_runtime)),
        HashSet::new(),
        sink.clone(),
        notifier.clone(),
        sentinel_orch::healing::MaintenanceConfig::from_env(),
    ));

    let backup_config = backup::BackupConfig::from_env();
    let backup_targets = backup::default_targets(&backup_config);
    let backup_locations = vec![backup::storage::StorageLocation {
        name: "primary".to_string(),
        kind: backup::storage::StorageKind::Local,
        root: backup_config.root.clone(),
        priority: 0,
        free_bytes: u64::MAX,
    }];
    let backup = Arc::new(BackupOrchestrator::new(
        backup_config,
        backup_targets,
        backup_locations,
        notifier.clone(),
    ));

    let federation = Arc::new(FederationOrchestrator::new(default_federation_nodes(), sink.clone()));

    let app_state = AppState::new(
        alerting.clone(),
        healing.clone(),
        backup.clone(),
        federation.clone(),
        db_pool.clone(),
        dashboard_tx,
    );

    let running = RunningFlag::new();
    spawn_background_loops(&running, alerting.clone(), healing.clone(), backup.clone(), federation.clone());

    let bind_address = format!("{}:{}", api_config.host, api_config.port);
    tracing::info!(address = %bind_address, "starting HTTP server");

    let server = api::build_server(api_config, app_state)?;
    let server_handle = server.handle();

    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("shutdown signal received, stopping background loops");
        running.stop();
        server_handle.stop(true).await;
    });

    server.await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

fn build_notifier(secrets: &SecretsConfig, dashboard_tx: tokio::sync::broadcast::Sender<sentinel_orch::platform::notifier::NotificationMessage>) -> Notifier {
    let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
    adapters.insert(
        Channel::Slack,
        Arc::new(SlackAdapter::new(read_secret(secrets, "slack_webhook_url", "SLACK_WEBHOOK_URL"))),
    );
    adapters.insert(
        Channel::Webhook,
        Arc::new(WebhookAdapter::new(read_secret(secrets, "generic_webhook_url", "GENERIC_WEBHOOK_URL"))),
    );
    adapters.insert(Channel::Email, Arc::new(RecordingAdapter));
    adapters.insert(Channel::Sms, Arc::new(RecordingAdapter));
    adapters.insert(Channel::Pagerduty, Arc::new(RecordingAdapter));
    adapters.insert(Channel::Dashboard, Arc::new(DashboardAdapter::new(dashboard_tx)));
    Notifier::new(adapters)
}

/// Seeded federation topology; real deployments populate this from config
/// rather than code (Open Question: no static discovery service is assumed).
fn default_federation_nodes() -> Vec<FederationNode> {
    vec![FederationNode {
        id: "local".to_string(),
        node_type: NodeType::Primary,
        status: sentinel_orch::federation::NodeStatus::Unknown,
        endpoint: std::env::var("FEDERATION_LOCAL_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:8080/api/v1/health".to_string()),
        bearer_token: None,
        capabilities: vec!["metrics".to_string(), "alerts".to_string()],
        last_seen: None,
        metrics_endpoints: vec![],
        priority: 0,
    }]
}

fn spawn_background_loops(
    running: &RunningFlag,
    alerting: Arc<AlertOrchestrator>,
    healing: Arc<SelfHealingOrchestrator>,
    backup: Arc<BackupOrchestrator>,
    federation: Arc<FederationOrchestrator>,
) {
    tokio::spawn(alerting.clone().run_evaluation_loop(
        running.clone(),
        std::time::Duration::from_secs(30),
        std::time::Duration::from_secs(60),
    ));
    tokio::spawn(alerting.clone().run_sweep_loop(running.clone()));
    tokio::spawn(healing.clone().run_health_loop(running.clone(), std::time::Duration::from_secs(30)));
    tokio::spawn(healing.run_maintenance_loop(running.clone()));
    tokio::spawn(backup.run_backup_loop(running.clone(), std::time::Duration::from_secs(3600)));
    tokio::spawn(federation.clone().run_health_loop(running.clone(), std::time::Duration::from_secs(60)));
    tokio::spawn(federation.run_propagation_loop(alerting, running.clone(), std::time::Duration::from_secs(60)));
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C signal"),
        _ = terminate => tracing::info!("received SIGTERM signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_federation_nodes_seeds_local_node() {
        let nodes = default_federation_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "local");
    }
}
