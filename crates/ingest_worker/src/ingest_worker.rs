//! Wiring: partition discovery, shared state construction, and the set of
//! long-running processes handed to the supervisor.

use anyhow::{Context, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use myco_adx::RecordSink;
use myco_eventhub::PartitionSource;

use crate::batch::{FlushTicker, RecordBatcher};
use crate::consumer::PartitionConsumer;
use crate::domain::dedup::Deduper;
use crate::domain::registry::DeviceRegistry;
use crate::domain::service::EnvelopeIngestService;

pub struct IngestWorkerConfig {
    pub batch_max_events: usize,
    pub batch_max_ms: u64,
    pub dedup_ttl_ms: u64,
}

/// A long-running pipeline process: runs until cancelled or failed.
pub type WorkerProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send,
>;

pub struct IngestWorker {
    consumers: Vec<PartitionConsumer>,
    ticker: FlushTicker,
}

impl std::fmt::Debug for IngestWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestWorker").finish_non_exhaustive()
    }
}

impl IngestWorker {
    /// Discover partitions and build one consumer per partition plus the
    /// flush ticker, all sharing one registry, deduper and batch.
    pub async fn new(
        source: &dyn PartitionSource,
        registry: DeviceRegistry,
        sink: Arc<dyn RecordSink>,
        config: IngestWorkerConfig,
    ) -> Result<Self> {
        let partition_ids = source
            .partition_ids()
            .await
            .context("partition discovery failed")?;
        info!(partitions = partition_ids.len(), "initializing ingest worker");

        let batcher = Arc::new(RecordBatcher::new(sink, config.batch_max_events));
        let service = Arc::new(EnvelopeIngestService::new(
            Arc::new(registry),
            Arc::new(Deduper::new(Duration::from_millis(config.dedup_ttl_ms))),
        ));

        let mut consumers = Vec::with_capacity(partition_ids.len());
        for partition_id in partition_ids {
            let receiver = source
                .open_partition(&partition_id)
                .await
                .with_context(|| format!("failed to open partition {partition_id}"))?;
            consumers.push(PartitionConsumer::new(
                partition_id,
                receiver,
                service.clone(),
                batcher.clone(),
            ));
        }

        let ticker = FlushTicker::new(batcher, Duration::from_millis(config.batch_max_ms));

        Ok(Self { consumers, ticker })
    }

    /// Hand the consumers and ticker over as independently spawnable
    /// processes.
    pub fn into_processes(self) -> Vec<WorkerProcess> {
        let mut processes: Vec<WorkerProcess> = Vec::with_capacity(self.consumers.len() + 1);
        for consumer in self.consumers {
            processes.push(Box::new(move |ctx| {
                Box::pin(async move { consumer.run(ctx).await })
            }));
        }
        let ticker = self.ticker;
        processes.push(Box::new(move |ctx| {
            Box::pin(async move { ticker.run(ctx).await })
        }));
        processes
    }
}
