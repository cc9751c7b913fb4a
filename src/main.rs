//! probesync - synthetic availability probe lifecycle manager
//!
//! Keeps the remote probe of every managed cluster in line with the cluster's
//! configuration, and removes it when the cluster is decommissioned.

mod auth;
mod config;
mod metrics;
mod probe;
mod sync;
mod web;

use config::Config;
use probe::ProbeClient;
use sync::{DeletionTimeoutPolicy, ProbeReconciler};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("probesync=info".parse()?))
        .init();

    // Load configuration
    let cfg = Config::load()?;
    tracing::info!(
        "Starting probesync {} on port {}...",
        env!("CARGO_PKG_VERSION"),
        cfg.http_port
    );

    // Metrics
    let handle = metrics::init_metrics_recorder()?;
    metrics::record_info(env!("CARGO_PKG_VERSION"));

    // One client, and so one token cache, shared by both policies
    let client = ProbeClient::from_config(&cfg)?;
    tracing::info!(
        tenant = %cfg.tenant,
        probes_url = %client.probes_url(),
        authenticated = client.is_authenticated(),
        only_public_clusters = cfg.only_public_clusters,
        "Probe API configured"
    );
    let reconciler = Arc::new(ProbeReconciler::new(
        client.clone(),
        cfg.only_public_clusters,
    ));
    let deletion = Arc::new(DeletionTimeoutPolicy::new(client, cfg.deletion_timeout));
    tracing::info!(
        "Probe deletion fails open after {}s",
        deletion.timeout().as_secs()
    );

    // Start web server
    let server = Server::new(cfg.http_port, reconciler, deletion, Some(handle));
    server.start().await?;

    Ok(())
}
