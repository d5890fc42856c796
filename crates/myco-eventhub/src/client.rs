//! azeventhubs-backed implementation of the partition traits.
//!
//! The SDK's event stream borrows its consumer client, so each partition
//! gets a forwarder task that owns both and feeds a bounded channel;
//! [`PartitionReceiver::receive`] drains that channel under its deadline.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use azeventhubs::consumer::{
    EventHubConsumerClient, EventHubConsumerClientOptions, EventPosition, ReadEventOptions,
};
use azeventhubs::BasicRetryPolicy;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::traits::{PartitionReceiver, PartitionSource, ReceivedEvent};

const FORWARD_BUFFER: usize = 256;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connection settings for one event hub; cheap to clone into partition
/// forwarder tasks.
#[derive(Clone)]
pub struct EventHubSource {
    connection_string: String,
    event_hub: String,
    consumer_group: String,
}

impl EventHubSource {
    pub fn new(connection_string: String, event_hub: String, consumer_group: String) -> Self {
        Self {
            connection_string,
            event_hub,
            consumer_group,
        }
    }

    async fn connect(&self) -> Result<EventHubConsumerClient<BasicRetryPolicy>> {
        EventHubConsumerClient::new_from_connection_string(
            self.consumer_group.clone(),
            self.connection_string.clone(),
            self.event_hub.clone(),
            EventHubConsumerClientOptions::default(),
        )
        .await
        .context("failed to connect to event hub")
    }
}

#[async_trait]
impl PartitionSource for EventHubSource {
    async fn partition_ids(&self) -> Result<Vec<String>> {
        let mut client = self.connect().await?;
        let ids = client
            .get_partition_ids()
            .await
            .context("failed to enumerate partitions")?;
        if let Err(e) = client.close().await {
            debug!(error = %e, "error closing discovery client");
        }
        info!(partitions = ids.len(), event_hub = %self.event_hub, "discovered partitions");
        Ok(ids)
    }

    async fn open_partition(&self, partition_id: &str) -> Result<Box<dyn PartitionReceiver>> {
        let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
        tokio::spawn(forward_partition(
            self.clone(),
            partition_id.to_string(),
            tx,
        ));
        Ok(Box::new(ChannelReceiver { events: rx }))
    }
}

/// Owns the consumer client and its event stream for one partition,
/// forwarding events until the receiving side goes away. Reconnects from
/// the stream tail after failures; consumption always starts at latest.
async fn forward_partition(
    source: EventHubSource,
    partition_id: String,
    tx: mpsc::Sender<Result<ReceivedEvent>>,
) {
    loop {
        if let Err(e) = run_stream(&source, &partition_id, &tx).await {
            warn!(partition_id = %partition_id, error = %e, "partition stream failed");
            if tx.send(Err(e)).await.is_err() {
                return;
            }
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_stream(
    source: &EventHubSource,
    partition_id: &str,
    tx: &mpsc::Sender<Result<ReceivedEvent>>,
) -> Result<()> {
    let mut client = source.connect().await?;
    let mut stream = client
        .read_events_from_partition(
            partition_id,
            EventPosition::latest(),
            ReadEventOptions::default(),
        )
        .await
        .context("failed to open partition stream")?;

    debug!(partition_id, "partition stream open");

    while let Some(event) = stream.next().await {
        let event = event.context("receive failed")?;
        let body = Bytes::copy_from_slice(event.body().context("event carried no body")?);
        let received = ReceivedEvent {
            body,
            enqueued_time: to_chrono(event.enqueued_time()),
        };
        if tx.send(Ok(received)).await.is_err() {
            break;
        }
    }

    if let Err(e) = stream.close().await {
        debug!(partition_id, error = %e, "error closing partition stream");
    }
    if let Err(e) = client.close().await {
        debug!(partition_id, error = %e, "error closing consumer client");
    }
    Ok(())
}

fn to_chrono(ts: time::OffsetDateTime) -> Option<DateTime<Utc>> {
    let millis = i64::try_from(ts.unix_timestamp_nanos() / 1_000_000).ok()?;
    DateTime::from_timestamp_millis(millis)
}

struct ChannelReceiver {
    events: mpsc::Receiver<Result<ReceivedEvent>>,
}

#[async_trait]
impl PartitionReceiver for ChannelReceiver {
    async fn receive(
        &mut self,
        max_events: usize,
        max_wait: Duration,
    ) -> Result<Vec<ReceivedEvent>> {
        let deadline = tokio::time::Instant::now() + max_wait;
        let mut batch = Vec::new();
        while batch.len() < max_events {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(Ok(event))) => batch.push(event),
                Ok(Some(Err(e))) => {
                    if batch.is_empty() {
                        return Err(e);
                    }
                    // Hand back what arrived; the failure resurfaces on the
                    // next call via the reconnecting forwarder.
                    break;
                }
                Ok(None) => {
                    if batch.is_empty() {
                        return Err(anyhow!("partition stream closed"));
                    }
                    break;
                }
                Err(_) => break,
            }
        }
        Ok(batch)
    }
}
