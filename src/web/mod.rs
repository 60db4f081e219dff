//! HTTP surface: router wiring and the shared handler state.

mod handlers;

pub use handlers::*;

use crate::alerts::AlertStore;
use crate::config::Config;
use crate::sampler::Sampler;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Everything a handler can reach, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<AlertStore>,
    pub sampler: Arc<Sampler>,
}

/// The hostpulse web front end.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: Config, store: Arc<AlertStore>, sampler: Arc<Sampler>) -> Self {
        Self {
            state: AppState {
                config,
                store,
                sampler,
            },
        }
    }

    /// Assemble the full route table.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // Dashboard
            .route("/", get(handlers::handle_dashboard))
            // Metrics API
            .route("/api/metrics", get(handlers::handle_get_metrics))
            .route("/api/metrics/native", get(handlers::handle_get_native_metrics))
            .route("/api/metrics/dual", get(handlers::handle_get_dual_metrics))
            .route("/api/metrics/source", get(handlers::handle_metrics_source))
            // Chart API
            .route("/api/charts/{kind}", get(handlers::handle_get_charts))
            // Alerts API
            .route(
                "/api/alerts",
                get(handlers::handle_get_alerts)
                    .post(handlers::handle_add_alert)
                    .delete(handlers::handle_clear_alerts),
            )
            .route("/api/alerts/summary", get(handlers::handle_alert_summary))
            // Reports
            .route("/api/reports/generate", post(handlers::handle_generate_report))
            // Health
            .route("/api/health", get(handlers::handle_health))
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024))
            .with_state(self.state.clone())
    }

    /// Bind the configured port and serve until shutdown.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("hostpulse listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
