/// API Module - HTTP REST & WebSocket Server
///
/// Read-only introspection surface (health/status/snapshots/websocket feed)
/// carried by every orchestrator, backed by the alerting, self-healing,
/// backup, and federation control loops.
pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod websocket;

use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use crate::alerting::AlertOrchestrator;
use crate::backup::BackupOrchestrator;
use crate::federation::FederationOrchestrator;
use crate::healing::SelfHealingOrchestrator;
use crate::platform::notifier::NotificationMessage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub alerting: Arc<AlertOrchestrator>,
    pub healing: Arc<SelfHealingOrchestrator>,
    pub backup: Arc<BackupOrchestrator>,
    pub federation: Arc<FederationOrchestrator>,
    pub db: Arc<SqlitePool>,
    pub dashboard_feed: tokio::sync::broadcast::Sender<NotificationMessage>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        alerting: Arc<AlertOrchestrator>,
        healing: Arc<SelfHealingOrchestrator>,
        backup: Arc<BackupOrchestrator>,
        federation: Arc<FederationOrchestrator>,
        db: Arc<SqlitePool>,
        dashboard_feed: tokio::sync::broadcast::Sender<NotificationMessage>,
    ) -> Self {
        Self {
            alerting,
            healing,
            backup,
            federation,
            db,
            dashboard_feed,
            started_at: Utc::now(),
        }
    }
}

// ============================================================================
// SERVER SETUP
// ============================================================================

/// API Server Configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub request_timeout: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: 4,
            request_timeout: 30,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(default.host),
            port: crate::platform::config::env_var("API_PORT", default.port),
            workers: crate::platform::config::env_var("API_WORKERS", default.workers),
            request_timeout: crate::platform::config::env_var("API_REQUEST_TIMEOUT", default.request_timeout),
        }
    }
}

/// Binds and builds the API server without running it, so callers can grab
/// its `Server` handle for graceful shutdown before awaiting it.
pub fn build_server(config: ApiConfig, app_state: AppState) -> std::io::Result<Server> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("starting API server on {}", addr);

    let db = app_state.db.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new((*db).clone()))
            .wrap(Logger::default())
            .wrap(middleware::RequestIdMiddleware)
            .route("/ws", web::get().to(websocket::ws_handler))
            .configure(|cfg| routes::configure_routes(cfg, db.clone()))
    })
    .workers(config.workers)
    .bind(&addr)?
    .run();

    Ok(server)
}

/// Runs the API server to completion.
pub async fn start_server(config: ApiConfig, app_state: AppState) -> std::io::Result<()> {
    build_server(config, app_state)?.await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_api_config_custom() {
        let config = ApiConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            workers: 8,
            request_timeout: 60,
        };
        assert_eq!(config.port, 3000);
    }
}
