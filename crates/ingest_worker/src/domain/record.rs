//! Output record types for the analytics sink.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Header block of the shaped body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapedHeader {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub proto: String,
    #[serde(rename = "msgId")]
    pub msg_id: String,
    #[serde(rename = "msgId_b64")]
    pub msg_id_b64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapedTimestamps {
    pub ms: i64,
    pub utc: String,
    pub mono_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapedGeo {
    pub lat: f64,
    pub lon: f64,
    pub lat_e7: i64,
    pub lon_e7: i64,
    pub acc_m: u64,
}

/// One sensor entry; `v` is the decimal-scaled reading when both the raw
/// integer and the scale were present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: serde_json::Value,
    pub vi: Option<i64>,
    pub vs: Option<u64>,
    pub v: Option<f64>,
    pub u: serde_json::Value,
    pub q: serde_json::Value,
}

/// The verbose, string-keyed rendition of a numeric-keyed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapedEnvelope {
    pub hdr: ShapedHeader,
    pub ts: ShapedTimestamps,
    pub seq: u64,
    pub geo: Option<ShapedGeo>,
    pub pack: Vec<SensorReading>,
    pub meta: serde_json::Value,
    pub hash_b64: String,
    pub sig_b64: String,
    /// Marker that this body was lifted from a compact numeric-key source.
    #[serde(rename = "_compact")]
    pub compact: bool,
    pub v: u64,
}

/// One row of the raw-ingest table: the shaped body plus envelope-level
/// metadata and flattened convenience columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    #[serde(rename = "ingestedAt")]
    pub ingested_at: String,
    #[serde(rename = "enqueuedTime")]
    pub enqueued_time: Option<String>,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "msgId")]
    pub msg_id: String,
    pub proto: String,
    pub seq: u64,
    #[serde(rename = "timeUtc")]
    pub time_utc: String,
    #[serde(rename = "monoMs")]
    pub mono_ms: u64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(rename = "accM")]
    pub acc_m: Option<u64>,
    pub body: ShapedEnvelope,
    #[serde(rename = "rawCborB64")]
    pub raw_cbor_b64: String,
    #[serde(rename = "hashB64")]
    pub hash_b64: String,
    #[serde(rename = "sigB64")]
    pub sig_b64: String,
}

impl OutputRecord {
    pub fn from_shaped(
        body: ShapedEnvelope,
        raw_cbor: &[u8],
        enqueued_time: Option<DateTime<Utc>>,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ingested_at: rfc3339(ingested_at),
            enqueued_time: enqueued_time.map(rfc3339),
            device_id: body.hdr.device_id.clone(),
            msg_id: body.hdr.msg_id.clone(),
            proto: body.hdr.proto.clone(),
            seq: body.seq,
            time_utc: body.ts.utc.clone(),
            mono_ms: body.ts.mono_ms,
            lat: body.geo.as_ref().map(|g| g.lat),
            lon: body.geo.as_ref().map(|g| g.lon),
            acc_m: body.geo.as_ref().map(|g| g.acc_m),
            raw_cbor_b64: STANDARD.encode(raw_cbor),
            hash_b64: body.hash_b64.clone(),
            sig_b64: body.sig_b64.clone(),
            body,
        }
    }
}

pub(crate) fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
