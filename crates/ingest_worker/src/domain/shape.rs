//! Pure transformation from the numeric-keyed envelope into the verbose
//! output body. Total by construction: missing or mistyped fields fall back
//! to zero values or null, never to an error.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use myco_envelope::{keys, Envelope, Value};
use uuid::Uuid;

use crate::domain::record::{
    SensorReading, ShapedEnvelope, ShapedGeo, ShapedHeader, ShapedTimestamps,
};

pub fn protocol_name(tag: u64) -> &'static str {
    match tag {
        1 => "lorawan",
        2 => "mqtt",
        3 => "ble",
        4 => "lte",
        _ => "other",
    }
}

pub fn shape(env: &Envelope) -> ShapedEnvelope {
    let device_id = env.text(keys::DEVICE_ID).unwrap_or_default().to_string();
    let msg_id = env.bytes(keys::MESSAGE_ID).unwrap_or_default();
    let ts_ms = env.i64(keys::TIMESTAMP_MS).unwrap_or(0);

    ShapedEnvelope {
        hdr: ShapedHeader {
            device_id,
            proto: protocol_name(env.u64(keys::PROTOCOL).unwrap_or(0)).to_string(),
            msg_id: format_msg_id(msg_id),
            msg_id_b64: STANDARD.encode(msg_id),
        },
        ts: ShapedTimestamps {
            ms: ts_ms,
            utc: format_utc_ms(ts_ms),
            mono_ms: env.u64(keys::MONOTONIC_MS).unwrap_or(0),
        },
        seq: env.u64(keys::SEQUENCE).unwrap_or(0),
        geo: env.get(keys::GEO).and_then(shape_geo),
        pack: env
            .get(keys::SENSOR_PACK)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(shape_reading).collect())
            .unwrap_or_default(),
        meta: env
            .get(keys::META)
            .map(Value::to_json)
            .unwrap_or(serde_json::Value::Null),
        hash_b64: base64_field(env, keys::CONTENT_HASH),
        sig_b64: base64_field(env, keys::SIGNATURE),
        compact: true,
        v: env.u64(keys::SCHEMA_VERSION).unwrap_or(0),
    }
}

fn base64_field(env: &Envelope, key: u64) -> String {
    env.bytes(key).map(|b| STANDARD.encode(b)).unwrap_or_default()
}

/// 16-byte ids render as a canonical lowercase UUID, anything else as base64.
fn format_msg_id(bytes: &[u8]) -> String {
    match <[u8; 16]>::try_from(bytes) {
        Ok(b) => Uuid::from_bytes(b).as_hyphenated().to_string(),
        Err(_) => STANDARD.encode(bytes),
    }
}

/// RFC3339 in UTC, sub-second digits only where they carry information.
/// Out-of-range wall clocks clamp to the epoch rather than failing.
fn format_utc_ms(ms: i64) -> String {
    crate::domain::record::rfc3339(
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    )
}

fn shape_geo(value: &Value) -> Option<ShapedGeo> {
    value.as_map()?;
    let lat_e7 = value.map_get(0).and_then(Value::as_i64).unwrap_or(0);
    let lon_e7 = value.map_get(1).and_then(Value::as_i64).unwrap_or(0);
    let acc_m = value.map_get(2).and_then(Value::as_u64).unwrap_or(0);
    Some(ShapedGeo {
        lat: lat_e7 as f64 / 1e7,
        lon: lon_e7 as f64 / 1e7,
        lat_e7,
        lon_e7,
        acc_m,
    })
}

fn shape_reading(item: &Value) -> Option<SensorReading> {
    item.as_map()?;
    let vi = item.map_get(1).and_then(Value::as_i64);
    let vs = item.map_get(2).and_then(Value::as_u64);
    let v = match (vi, vs) {
        (Some(vi), Some(vs)) => pow10(vs).map(|scale| vi as f64 / scale as f64),
        _ => None,
    };
    Some(SensorReading {
        id: passthrough(item, 0),
        vi,
        vs,
        v,
        u: passthrough(item, 3),
        q: passthrough(item, 4),
    })
}

fn passthrough(item: &Value, key: u64) -> serde_json::Value {
    item.map_get(key)
        .map(Value::to_json)
        .unwrap_or(serde_json::Value::Null)
}

/// Integer power of ten in 64-bit arithmetic; `None` once it would overflow
/// (`vs > 18`).
fn pow10(exp: u64) -> Option<i64> {
    u32::try_from(exp).ok().and_then(|e| 10i64.checked_pow(e))
}
