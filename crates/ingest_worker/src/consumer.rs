//! Per-partition receive loop.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use myco_eventhub::PartitionReceiver;

use crate::batch::RecordBatcher;
use crate::domain::service::EnvelopeIngestService;

const RECEIVE_MAX_EVENTS: usize = 100;
const RECEIVE_MAX_WAIT: Duration = Duration::from_secs(5);
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// One task per partition: pull bounded event batches, run each event
/// through the ingest service, append survivors to the shared batch.
/// Receive timeouts surface as empty batches and are benign; other receive
/// errors log and back off without ever ending the loop.
pub struct PartitionConsumer {
    partition_id: String,
    receiver: Box<dyn PartitionReceiver>,
    service: Arc<EnvelopeIngestService>,
    batcher: Arc<RecordBatcher>,
}

impl PartitionConsumer {
    pub fn new(
        partition_id: String,
        receiver: Box<dyn PartitionReceiver>,
        service: Arc<EnvelopeIngestService>,
        batcher: Arc<RecordBatcher>,
    ) -> Self {
        Self {
            partition_id,
            receiver,
            service,
            batcher,
        }
    }

    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(partition_id = %self.partition_id, "starting partition consumer");
        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(partition_id = %self.partition_id, "partition consumer shutting down");
                    break;
                }
                result = self.receiver.receive(RECEIVE_MAX_EVENTS, RECEIVE_MAX_WAIT) => {
                    match result {
                        Ok(events) => {
                            if !events.is_empty() {
                                debug!(
                                    partition_id = %self.partition_id,
                                    events = events.len(),
                                    "received event batch"
                                );
                            }
                            for event in events {
                                if let Some(record) =
                                    self.service.process(&event.body, event.enqueued_time)
                                {
                                    self.batcher.append(record).await;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(
                                partition_id = %self.partition_id,
                                error = %e,
                                "receive failed, backing off"
                            );
                            tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use myco_adx::MockRecordSink;
    use myco_envelope::testkit::{sample_envelope, seal, signing_key};
    use myco_envelope::{encode, keys, Value};
    use myco_eventhub::{MockPartitionReceiver, ReceivedEvent};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    use crate::domain::dedup::Deduper;
    use crate::domain::registry::DeviceRegistry;

    fn service(seed: u8) -> (Arc<EnvelopeIngestService>, NamedTempFile) {
        let key_b64 = STANDARD.encode(signing_key(seed).verifying_key().to_bytes());
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"d1": "{key_b64}"}}"#).expect("write registry");
        let registry = DeviceRegistry::load(file.path()).expect("load registry");
        let service = Arc::new(EnvelopeIngestService::new(
            Arc::new(registry),
            Arc::new(Deduper::new(Duration::from_secs(60))),
        ));
        (service, file)
    }

    fn sealed_event(seed: u8, seq: u64) -> ReceivedEvent {
        let mut env = sample_envelope();
        env.insert(keys::SEQUENCE, Value::UInt(seq));
        let mut msg_id = vec![0u8; 16];
        msg_id[15] = seq as u8;
        env.insert(keys::MESSAGE_ID, Value::Bytes(msg_id));
        ReceivedEvent {
            body: Bytes::from(encode(&seal(env, &signing_key(seed))).unwrap()),
            enqueued_time: None,
        }
    }

    #[tokio::test]
    async fn events_flow_through_to_the_batch_in_order() {
        let (service, _file) = service(7);

        let mut receiver = MockPartitionReceiver::new();
        let mut delivered = false;
        receiver.expect_receive().returning(move |_, _| {
            if delivered {
                Ok(vec![])
            } else {
                delivered = true;
                Ok(vec![
                    sealed_event(7, 1),
                    sealed_event(7, 2),
                    ReceivedEvent {
                        body: Bytes::from_static(b"junk"),
                        enqueued_time: None,
                    },
                    sealed_event(7, 3),
                ])
            }
        });

        let mut sink = MockRecordSink::new();
        sink.expect_ingest()
            .withf(|payload, count| {
                let seqs: Vec<u64> = std::str::from_utf8(payload)
                    .unwrap()
                    .lines()
                    .map(|line| {
                        serde_json::from_str::<serde_json::Value>(line).unwrap()["seq"]
                            .as_u64()
                            .unwrap()
                    })
                    .collect();
                *count == 3 && seqs == vec![1, 2, 3]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let batcher = Arc::new(RecordBatcher::new(Arc::new(sink), 3));
        let consumer =
            PartitionConsumer::new("0".into(), Box::new(receiver), service, batcher.clone());

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(consumer.run(ctx.clone()));
        // The third valid event crosses the size threshold and flushes.
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(batcher.pending(), 0);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let (service, _file) = service(7);
        let mut receiver = MockPartitionReceiver::new();
        receiver.expect_receive().returning(|_, _| Ok(vec![]));

        let sink = MockRecordSink::new();
        let batcher = Arc::new(RecordBatcher::new(Arc::new(sink), 10));
        let consumer = PartitionConsumer::new("1".into(), Box::new(receiver), service, batcher);

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(consumer.run(ctx.clone()));
        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn receive_errors_do_not_end_the_loop() {
        let (service, _file) = service(7);
        let mut receiver = MockPartitionReceiver::new();
        let mut calls = 0u32;
        receiver.expect_receive().returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("transient receive failure"))
            } else {
                Ok(vec![])
            }
        });

        let sink = MockRecordSink::new();
        let batcher = Arc::new(RecordBatcher::new(Arc::new(sink), 10));
        let consumer = PartitionConsumer::new("2".into(), Box::new(receiver), service, batcher);

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(consumer.run(ctx.clone()));
        // Outlive the 1 s backoff to prove the loop kept going.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        ctx.cancel();
        handle.await.unwrap().unwrap();
    }
}
