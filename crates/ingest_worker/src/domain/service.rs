//! Per-event pipeline: decode → dedup → key lookup → verify → shape.
//!
//! Nothing here raises; every failure mode is a drop, and the partition
//! loop above stays alive regardless of what arrives on the wire.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use myco_envelope::{decode, keys, verify_envelope};

use crate::domain::dedup::{dedup_key, Deduper};
use crate::domain::record::OutputRecord;
use crate::domain::registry::DeviceRegistry;
use crate::domain::shape::shape;

pub struct EnvelopeIngestService {
    registry: Arc<DeviceRegistry>,
    deduper: Arc<Deduper>,
}

impl EnvelopeIngestService {
    pub fn new(registry: Arc<DeviceRegistry>, deduper: Arc<Deduper>) -> Self {
        Self { registry, deduper }
    }

    /// Run one broker payload through the pipeline. `None` means the event
    /// was dropped: malformed, duplicate, unregistered device, or failed
    /// verification. Only verification failures name the device at `warn`;
    /// the other drops stay quiet.
    pub fn process(
        &self,
        payload: &[u8],
        enqueued_time: Option<DateTime<Utc>>,
    ) -> Option<OutputRecord> {
        let env = match decode(payload) {
            Ok(env) => env,
            Err(e) => {
                trace!(error = %e, "dropping undecodable payload");
                return None;
            }
        };

        let device_id = env.text(keys::DEVICE_ID).unwrap_or_default().to_string();
        let msg_id = env.bytes(keys::MESSAGE_ID).unwrap_or_default();
        if self.deduper.seen(&dedup_key(&device_id, msg_id)) {
            trace!(device_id = %device_id, "dropping duplicate envelope");
            return None;
        }

        let Some(pubkey) = self.registry.verifying_key(&device_id) else {
            debug!(device_id = %device_id, "dropping envelope from unregistered device");
            return None;
        };

        if let Err(reason) = verify_envelope(&env, pubkey) {
            warn!(device_id = %device_id, reason = %reason, "dropping envelope failing verification");
            return None;
        }

        let body = shape(&env);
        Some(OutputRecord::from_shaped(
            body,
            payload,
            enqueued_time,
            Utc::now(),
        ))
    }
}
