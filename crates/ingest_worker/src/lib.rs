//! The ingest pipeline: per-partition consumers running
//! decode → dedup → verify → shape over broker payloads, feeding a shared
//! batch that is flushed to the analytics sink by size and by time.

pub mod batch;
pub mod consumer;
pub mod domain;
pub mod ingest_worker;

pub use batch::{FlushTicker, RecordBatcher};
pub use consumer::PartitionConsumer;
pub use domain::*;
pub use ingest_worker::{IngestWorker, IngestWorkerConfig, WorkerProcess};
