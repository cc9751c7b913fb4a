//! Web server module.

mod handlers;

pub use handlers::*;

use crate::sync::{DeletionTimeoutPolicy, ProbeReconciler};

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<ProbeReconciler>,
    pub deletion: Arc<DeletionTimeoutPolicy>,
    pub metrics: Option<PrometheusHandle>,
}

/// HTTP surface through which the reconciliation loop drives probe lifecycles.
pub struct Server {
    http_port: u16,
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(
        http_port: u16,
        reconciler: Arc<ProbeReconciler>,
        deletion: Arc<DeletionTimeoutPolicy>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            http_port,
            state: AppState {
                reconciler,
                deletion,
                metrics,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        Router::new()
            .route(
                "/api/clusters/{cluster_id}/probe",
                get(handlers::handle_get_probe)
                    .put(handlers::handle_ensure_probe)
                    .delete(handlers::handle_delete_probe),
            )
            .route("/metrics", get(handlers::handle_metrics))
            .route("/healthz", get(handlers::handle_healthz))
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!("Web server listening on {}", listener.local_addr()?);
        axum::serve(listener, self.routes()).await?;
        Ok(())
    }
}
