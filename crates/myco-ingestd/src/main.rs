mod config;
mod supervisor;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ingest_worker::{DeviceRegistry, IngestWorker, IngestWorkerConfig};
use myco_adx::{AdxIngestClient, AdxIngestConfig};
use myco_eventhub::EventHubSource;

#[tokio::main]
async fn main() {
    let config = match config::IngestConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(config).await {
        error!(error = format!("{e:#}"), "startup failed");
        std::process::exit(1);
    }
}

async fn run(config: config::IngestConfig) -> Result<()> {
    let event_hub = config.event_hub_name().context(
        "could not determine event hub name: set EVENTHUB_NAME or include EntityPath= in the connection string",
    )?;

    let registry = DeviceRegistry::load(Path::new(&config.device_registry_path))
        .context("failed to load device registry")?;

    let sink = AdxIngestClient::new(AdxIngestConfig {
        ingest_uri: config.adx_ingest_uri.clone(),
        database: config.adx_database.clone(),
        table: config.adx_raw_table.clone(),
        mapping: config.adx_raw_mapping.clone(),
        tenant_id: config.adx_tenant_id.clone(),
        client_id: config.adx_client_id.clone(),
        client_secret: config.adx_client_secret.clone(),
    })
    .context("failed to construct analytics ingest client")?;

    let source = EventHubSource::new(
        config.iothub_eventhub_connection_string.clone(),
        event_hub.clone(),
        config.eventhub_consumer_group.clone(),
    );

    let worker = IngestWorker::new(
        &source,
        registry,
        Arc::new(sink),
        IngestWorkerConfig {
            batch_max_events: config.batch_max_events,
            batch_max_ms: config.batch_max_ms,
            dedup_ttl_ms: config.dedup_ttl_ms,
        },
    )
    .await?;

    info!(
        event_hub = %event_hub,
        consumer_group = %config.eventhub_consumer_group,
        table = %config.adx_raw_table,
        "ingest pipeline starting"
    );
    supervisor::run(worker.into_processes()).await
}
