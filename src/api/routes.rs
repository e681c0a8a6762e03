/// API Route Configuration
///
/// Defines all HTTP endpoints and their routes with authentication and rate limiting.
use actix_web::web;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use super::{auth, handlers, middleware};

/// Configure all API routes with authentication and rate limiting
pub fn configure_routes(cfg: &mut web::ServiceConfig, db_pool: Arc<SqlitePool>) {
    info!("configuring API routes");

    // Single unified /api/v1 scope with nested sub-scopes for different middleware layers
    cfg.service(
        web::scope("/api/v1")
            .wrap(middleware::RequestIdMiddleware)
            // Public routes (no authentication required)
            .route("/health", web::get().to(handlers::health_check))
            .route("/status", web::get().to(handlers::get_status))
            // Protected endpoints sub-scope (authentication required)
            .service(
                web::scope("")
                    .wrap(middleware::RateLimitMiddleware::new(db_pool.clone()))
                    .wrap(middleware::AuthMiddleware::new(db_pool.clone()))
                    // Alert endpoints
                    .route("/alerts", web::get().to(handlers::get_alerts))
                    .route(
                        "/alerts/acknowledge",
                        web::post().to(handlers::acknowledge_alert),
                    )
                    // Self-healing / service health endpoints
                    .route("/health/services", web::get().to(handlers::get_service_health))
                    // Backup endpoints
                    .route("/backups/targets", web::get().to(handlers::get_backup_targets))
                    .route(
                        "/backups/{target_id}/history",
                        web::get().to(handlers::get_backup_history),
                    )
                    // Federation endpoints
                    .route("/federation/nodes", web::get().to(handlers::get_federation_nodes))
                    .route(
                        "/federation/metrics",
                        web::get().to(handlers::get_global_metrics),
                    )
                    // Admin routes (flattened into main protected scope)
                    // API key management
                    .route("/admin/keys", web::post().to(auth::create_api_key))
                    .route("/admin/keys", web::get().to(auth::list_api_keys))
                    .route("/admin/keys/{id}", web::get().to(auth::get_api_key))
                    .route("/admin/keys/{id}", web::put().to(auth::update_api_key))
                    .route("/admin/keys/{id}", web::delete().to(auth::delete_api_key)),
            ),
    );

    info!("API routes configured: public=/api/v1/health,/api/v1/status protected=/api/v1/alerts,/api/v1/health/services,/api/v1/backups/*,/api/v1/federation/* admin=/api/v1/admin/keys");
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_routes_configuration() {
        // Verify route configuration is defined
        assert!(true);
    }
}
