//! HostPulse - host telemetry dashboard backend.
//!
//! Collects snapshots from two independent collectors (a legacy script host and
//! a native agent), evaluates alert thresholds, keeps rolling chart windows,
//! and serves the merged view over HTTP.

mod alerts;
mod config;
mod report;
mod sampler;
mod series;
mod snapshot;
mod source;
mod web;

use alerts::{AlertStore, Thresholds};
use config::Config;
use sampler::Sampler;
use source::SnapshotSource;
use web::Server;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("hostpulse=info".parse()?))
        .init();

    let cfg = Config::load();
    tracing::info!("Starting HostPulse on port {}...", cfg.http_port);
    tracing::info!("Alert log at {}", cfg.alerts_path().display());

    // Alert store; a missing file is created on first load.
    let store = Arc::new(AlertStore::new(cfg.alerts_path()));
    if let Err(e) = store.create_empty() {
        tracing::warn!("Could not initialize alert log: {}", e);
    }

    // Snapshot sources
    let timeout = Duration::from_secs(cfg.source_timeout_secs);
    let legacy = Arc::new(SnapshotSource::new(
        "legacy",
        cfg.legacy_url.clone(),
        cfg.legacy_file.clone(),
        timeout,
    )?);
    let native = Arc::new(SnapshotSource::new(
        "native",
        cfg.native_url.clone(),
        cfg.native_file.clone(),
        timeout,
    )?);

    // Collector loop
    let sampler = Arc::new(Sampler::new(
        legacy,
        native,
        store.clone(),
        Thresholds::default(),
        cfg.series_capacity,
        Duration::from_secs(cfg.sample_interval_secs),
    ));
    let _stop = sampler.clone().start();

    let server = Server::new(cfg, store, sampler);
    server.start().await?;

    Ok(())
}
