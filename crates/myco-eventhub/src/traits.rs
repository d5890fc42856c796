use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One framed payload received from a partition.
#[derive(Debug, Clone)]
pub struct ReceivedEvent {
    pub body: Bytes,
    /// Broker-side enqueue time, when the SDK surfaces one.
    pub enqueued_time: Option<DateTime<Utc>>,
}

/// Discovery and per-partition attachment.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PartitionSource: Send + Sync {
    /// Enumerate the partition ids of the configured event hub.
    async fn partition_ids(&self) -> Result<Vec<String>>;

    /// Attach to one partition at the current stream tail.
    async fn open_partition(&self, partition_id: &str) -> Result<Box<dyn PartitionReceiver>>;
}

/// Bounded pull over one partition.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PartitionReceiver: Send {
    /// Receive up to `max_events`, waiting at most `max_wait`. Expiry of the
    /// wait is not an error: whatever arrived so far is returned, possibly
    /// nothing.
    async fn receive(
        &mut self,
        max_events: usize,
        max_wait: Duration,
    ) -> Result<Vec<ReceivedEvent>>;
}
