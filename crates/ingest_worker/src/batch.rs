//! Shared record batch with size- and time-triggered flushing.

use bytes::Bytes;
use myco_adx::RecordSink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::record::OutputRecord;

/// One batch shared by all partition consumers. The mutex covers only
/// pushes, length reads and the swap; serialization and the sink call
/// happen on a drained local vector, so flushes may overlap safely.
pub struct RecordBatcher {
    records: Mutex<Vec<OutputRecord>>,
    max_events: usize,
    sink: Arc<dyn RecordSink>,
}

impl RecordBatcher {
    pub fn new(sink: Arc<dyn RecordSink>, max_events: usize) -> Self {
        Self {
            records: Mutex::new(Vec::with_capacity(max_events)),
            max_events,
            sink,
        }
    }

    /// Append one record, flushing when the size threshold is crossed.
    pub async fn append(&self, record: OutputRecord) {
        let should_flush = {
            let mut records = self.records.lock();
            records.push(record);
            records.len() >= self.max_events
        };
        if should_flush {
            self.flush().await;
        }
    }

    /// Swap the batch out and issue one sink call for it. A sink failure is
    /// logged and the drained batch discarded; upstream re-delivery is not
    /// available because offsets are never checkpointed.
    pub async fn flush(&self) {
        let drained = {
            let mut records = self.records.lock();
            std::mem::replace(&mut *records, Vec::with_capacity(self.max_events))
        };
        if drained.is_empty() {
            return;
        }

        let count = drained.len();
        let payload = match encode_multijson(&drained) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, records = count, "failed to serialize batch, dropping");
                return;
            }
        };
        match self.sink.ingest(payload, count).await {
            Ok(()) => info!(records = count, "flushed record batch"),
            Err(e) => error!(error = %e, records = count, "sink ingest failed, dropping batch"),
        }
    }

    pub fn pending(&self) -> usize {
        self.records.lock().len()
    }
}

/// Newline-delimited JSON: one record per line, no leading or trailing
/// newline.
fn encode_multijson(records: &[OutputRecord]) -> serde_json::Result<Bytes> {
    let mut buf = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            buf.push(b'\n');
        }
        serde_json::to_writer(&mut buf, record)?;
    }
    Ok(Bytes::from(buf))
}

/// Periodic flush driver; also performs the final flush on shutdown.
pub struct FlushTicker {
    batcher: Arc<RecordBatcher>,
    interval: Duration,
}

impl FlushTicker {
    pub fn new(batcher: Arc<RecordBatcher>, interval: Duration) -> Self {
        Self { batcher, interval }
    }

    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(interval_ms = self.interval.as_millis() as u64, "starting flush ticker");
        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("flush ticker shutting down");
                    self.batcher.flush().await;
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.batcher.flush().await;
                }
            }
        }
        Ok(())
    }
}
