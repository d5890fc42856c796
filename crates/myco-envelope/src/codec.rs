//! Canonical CBOR codec for telemetry envelopes.
//!
//! Encoding follows the RFC 8949 core deterministic profile: shortest-form
//! integers and length prefixes, map entries ordered bytewise by their
//! encoded keys, shortest lossless float width, no indefinite-length items.
//! Decoding accepts any definite-length integer width but rejects
//! indefinite lengths, tags and duplicate map keys outright.

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use thiserror::Error;

use crate::envelope::Envelope;
use crate::keys;
use crate::value::Value;

const MAX_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cbor decode: {0}")]
    Decode(String),
    #[error("indefinite-length item")]
    IndefiniteLength,
    #[error("tags not allowed")]
    Tag,
    #[error("unsupported simple value")]
    Simple,
    #[error("duplicate map key")]
    DuplicateKey,
    #[error("integer out of range")]
    IntegerRange,
    #[error("nesting too deep")]
    DepthExceeded,
    #[error("top-level item is not a map")]
    NotAMap,
    #[error("cbor encode: {0}")]
    Encode(String),
}

impl From<minicbor::decode::Error> for CodecError {
    fn from(err: minicbor::decode::Error) -> Self {
        CodecError::Decode(err.to_string())
    }
}

impl From<minicbor::encode::Error<std::convert::Infallible>> for CodecError {
    fn from(err: minicbor::encode::Error<std::convert::Infallible>) -> Self {
        CodecError::Encode(err.to_string())
    }
}

/// Decode one envelope from the front of `bytes`. Trailing bytes are
/// ignored, matching the framing of the broker payloads.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let mut dec = Decoder::new(bytes);
    match decode_value(&mut dec, 0)? {
        Value::Map(entries) => Ok(Envelope::from_entries(entries)),
        _ => Err(CodecError::NotAMap),
    }
}

/// Canonical encoding of the whole envelope, integrity fields included.
pub fn encode(env: &Envelope) -> Result<Vec<u8>, CodecError> {
    encode_skipping(env, &[])
}

/// The canonical image: the envelope with keys 10 and 11 removed. This is
/// the exact byte sequence the device hashed and signed.
pub fn encode_canonical(env: &Envelope) -> Result<Vec<u8>, CodecError> {
    encode_skipping(env, &[keys::CONTENT_HASH, keys::SIGNATURE])
}

fn encode_skipping(env: &Envelope, skip: &[u64]) -> Result<Vec<u8>, CodecError> {
    let mut entries = Vec::with_capacity(env.entries().len());
    for (k, v) in env.entries() {
        if let Value::UInt(n) = k {
            if skip.contains(n) {
                continue;
            }
        }
        let mut key_bytes = Vec::new();
        write_value(&mut key_bytes, k)?;
        let mut val_bytes = Vec::new();
        write_value(&mut val_bytes, v)?;
        entries.push((key_bytes, val_bytes));
    }
    entries.sort();

    let mut out = Vec::new();
    Encoder::new(&mut out).map(entries.len() as u64)?;
    for (key_bytes, val_bytes) in entries {
        out.extend_from_slice(&key_bytes);
        out.extend_from_slice(&val_bytes);
    }
    Ok(out)
}

fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::Null => {
            Encoder::new(&mut *buf).null()?;
        }
        Value::Bool(b) => {
            Encoder::new(&mut *buf).bool(*b)?;
        }
        Value::UInt(n) => {
            Encoder::new(&mut *buf).u64(*n)?;
        }
        Value::Int(n) => {
            Encoder::new(&mut *buf).i64(*n)?;
        }
        Value::Float(f) => {
            write_float(buf, *f)?;
        }
        Value::Bytes(b) => {
            Encoder::new(&mut *buf).bytes(b)?;
        }
        Value::Text(s) => {
            Encoder::new(&mut *buf).str(s)?;
        }
        Value::Array(items) => {
            Encoder::new(&mut *buf).array(items.len() as u64)?;
            for item in items {
                write_value(buf, item)?;
            }
        }
        Value::Map(pairs) => {
            let mut entries = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                let mut key_bytes = Vec::new();
                write_value(&mut key_bytes, k)?;
                let mut val_bytes = Vec::new();
                write_value(&mut val_bytes, v)?;
                entries.push((key_bytes, val_bytes));
            }
            entries.sort();
            Encoder::new(&mut *buf).map(entries.len() as u64)?;
            for (key_bytes, val_bytes) in entries {
                buf.extend_from_slice(&key_bytes);
                buf.extend_from_slice(&val_bytes);
            }
        }
    }
    Ok(())
}

/// Shortest lossless float width; NaN collapses to the canonical `0xf97e00`.
fn write_float(buf: &mut Vec<u8>, f: f64) -> Result<(), CodecError> {
    let mut enc = Encoder::new(&mut *buf);
    if f.is_nan() {
        enc.f16(f32::NAN)?;
        return Ok(());
    }
    let narrow16 = half::f16::from_f64(f);
    if f64::from(narrow16) == f {
        enc.f16(narrow16.to_f32())?;
    } else if f64::from(f as f32) == f {
        enc.f32(f as f32)?;
    } else {
        enc.f64(f)?;
    }
    Ok(())
}

fn decode_value(dec: &mut Decoder, depth: usize) -> Result<Value, CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::DepthExceeded);
    }
    match dec.datatype()? {
        Type::Bool => Ok(Value::Bool(dec.bool()?)),
        Type::Null => {
            dec.null()?;
            Ok(Value::Null)
        }
        Type::Undefined => {
            dec.undefined()?;
            Ok(Value::Null)
        }
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Ok(Value::UInt(dec.u64()?)),
        Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::Int => {
            let n = i128::from(dec.int()?);
            if n >= 0 {
                Ok(Value::UInt(n as u64))
            } else {
                i64::try_from(n)
                    .map(Value::Int)
                    .map_err(|_| CodecError::IntegerRange)
            }
        }
        Type::F16 => Ok(Value::Float(f64::from(dec.f16()?))),
        Type::F32 => Ok(Value::Float(f64::from(dec.f32()?))),
        Type::F64 => Ok(Value::Float(dec.f64()?)),
        Type::Bytes => Ok(Value::Bytes(dec.bytes()?.to_vec())),
        Type::String => Ok(Value::Text(dec.str()?.to_owned())),
        Type::Array => {
            let len = dec.array()?.ok_or(CodecError::IndefiniteLength)?;
            let len = usize::try_from(len).map_err(|_| CodecError::IntegerRange)?;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(decode_value(dec, depth + 1)?);
            }
            Ok(Value::Array(items))
        }
        Type::Map => {
            let len = dec.map()?.ok_or(CodecError::IndefiniteLength)?;
            let len = usize::try_from(len).map_err(|_| CodecError::IntegerRange)?;
            let mut entries: Vec<(Value, Value)> = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                let key = decode_value(dec, depth + 1)?;
                if entries.iter().any(|(k, _)| *k == key) {
                    return Err(CodecError::DuplicateKey);
                }
                let val = decode_value(dec, depth + 1)?;
                entries.push((key, val));
            }
            Ok(Value::Map(entries))
        }
        Type::BytesIndef | Type::StringIndef | Type::ArrayIndef | Type::MapIndef | Type::Break => {
            Err(CodecError::IndefiniteLength)
        }
        Type::Tag => Err(CodecError::Tag),
        Type::Simple => Err(CodecError::Simple),
        Type::Unknown(byte) => Err(CodecError::Decode(format!("unknown cbor type {byte:#x}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(entries: Vec<(u64, Value)>) -> Envelope {
        let mut env = Envelope::default();
        for (k, v) in entries {
            env.insert(k, v);
        }
        env
    }

    #[test]
    fn integers_use_shortest_form() {
        let cases: Vec<(Value, Vec<u8>)> = vec![
            (Value::UInt(0), vec![0x00]),
            (Value::UInt(23), vec![0x17]),
            (Value::UInt(24), vec![0x18, 0x18]),
            (Value::UInt(500), vec![0x19, 0x01, 0xf4]),
            (Value::UInt(100_000), vec![0x1a, 0x00, 0x01, 0x86, 0xa0]),
            (Value::Int(-1), vec![0x20]),
            (Value::Int(-500), vec![0x39, 0x01, 0xf3]),
        ];
        for (value, expected) in cases {
            let mut buf = Vec::new();
            write_value(&mut buf, &value).unwrap();
            assert_eq!(buf, expected, "shortest form for {value:?}");
        }
    }

    #[test]
    fn strings_and_bytes_use_their_major_types() {
        let mut text = Vec::new();
        write_value(&mut text, &Value::Text("a".into())).unwrap();
        assert_eq!(text, vec![0x61, 0x61]);

        let mut bytes = Vec::new();
        write_value(&mut bytes, &Value::Bytes(vec![0x61])).unwrap();
        assert_eq!(bytes, vec![0x41, 0x61]);
    }

    #[test]
    fn floats_shrink_to_shortest_lossless_width() {
        let mut half_width = Vec::new();
        write_value(&mut half_width, &Value::Float(1.5)).unwrap();
        assert_eq!(half_width, vec![0xf9, 0x3e, 0x00]);

        let mut single = Vec::new();
        write_value(&mut single, &Value::Float(f64::from(0.1f32))).unwrap();
        assert_eq!(single[0], 0xfa);

        let mut double = Vec::new();
        write_value(&mut double, &Value::Float(0.1)).unwrap();
        assert_eq!(double[0], 0xfb);

        let mut nan = Vec::new();
        write_value(&mut nan, &Value::Float(f64::NAN)).unwrap();
        assert_eq!(nan, vec![0xf9, 0x7e, 0x00]);
    }

    #[test]
    fn map_keys_sort_by_encoded_bytes() {
        let env = env_with(vec![
            (5, Value::UInt(1)),
            (0, Value::UInt(2)),
            (24, Value::UInt(3)),
        ]);
        let bytes = encode(&env).unwrap();
        // 3 entries: key 0 (0x00), key 5 (0x05), key 24 (0x18 0x18).
        assert_eq!(
            bytes,
            vec![0xa3, 0x00, 0x02, 0x05, 0x01, 0x18, 0x18, 0x03]
        );
    }

    #[test]
    fn encoding_is_deterministic_across_insertion_orders() {
        let forward = env_with(vec![
            (0, Value::UInt(1)),
            (1, Value::Text("d1".into())),
            (7, Value::Map(vec![
                (Value::UInt(1), Value::Int(-3)),
                (Value::UInt(0), Value::UInt(9)),
            ])),
        ]);
        let reverse = env_with(vec![
            (7, Value::Map(vec![
                (Value::UInt(0), Value::UInt(9)),
                (Value::UInt(1), Value::Int(-3)),
            ])),
            (1, Value::Text("d1".into())),
            (0, Value::UInt(1)),
        ]);
        assert_eq!(encode(&forward).unwrap(), encode(&reverse).unwrap());
    }

    #[test]
    fn canonical_image_drops_integrity_keys() {
        let unsigned = env_with(vec![(0, Value::UInt(1)), (1, Value::Text("d1".into()))]);
        let mut sealed = unsigned.clone();
        sealed.insert(crate::keys::CONTENT_HASH, Value::Bytes(vec![0u8; 32]));
        sealed.insert(crate::keys::SIGNATURE, Value::Bytes(vec![0u8; 64]));

        assert_eq!(
            encode_canonical(&sealed).unwrap(),
            encode_canonical(&unsigned).unwrap()
        );
        assert_eq!(
            encode_canonical(&unsigned).unwrap(),
            encode(&unsigned).unwrap()
        );
        assert_ne!(encode(&sealed).unwrap(), encode(&unsigned).unwrap());
    }

    #[test]
    fn round_trip_preserves_structure() {
        let env = env_with(vec![
            (0, Value::UInt(1)),
            (1, Value::Text("dev-a".into())),
            (3, Value::Bytes(vec![0xaa; 16])),
            (4, Value::UInt(1_700_000_000_000)),
            (8, Value::Array(vec![Value::Map(vec![
                (Value::UInt(0), Value::Text("t1".into())),
                (Value::UInt(1), Value::Int(-2345)),
            ])])),
            (9, Value::Null),
        ]);
        let decoded = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(decoded.u64(0), Some(1));
        assert_eq!(decoded.text(1), Some("dev-a"));
        assert_eq!(decoded.bytes(3), Some(&[0xaa; 16][..]));
        assert_eq!(decoded.i64(4), Some(1_700_000_000_000));
        assert_eq!(
            decoded.get(8).and_then(|v| v.as_array()).map(<[Value]>::len),
            Some(1)
        );
        assert_eq!(decoded.get(9), Some(&Value::Null));
    }

    #[test]
    fn rejects_indefinite_length_items() {
        assert!(matches!(
            decode(&[0xbf, 0xff]),
            Err(CodecError::IndefiniteLength)
        ));
        assert!(matches!(
            decode(&[0xa1, 0x00, 0x9f, 0xff]),
            Err(CodecError::IndefiniteLength)
        ));
    }

    #[test]
    fn rejects_duplicate_map_keys() {
        assert!(matches!(
            decode(&[0xa2, 0x01, 0x01, 0x01, 0x02]),
            Err(CodecError::DuplicateKey)
        ));
    }

    #[test]
    fn rejects_non_map_roots_and_tags() {
        assert!(matches!(decode(&[0x01]), Err(CodecError::NotAMap)));
        assert!(matches!(
            decode(&[0xa1, 0x00, 0xc0, 0x61, 0x61]),
            Err(CodecError::Tag)
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        let env = env_with(vec![(1, Value::Text("d1".into()))]);
        let bytes = encode(&env).unwrap();
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn wide_encodings_of_small_integers_still_decode() {
        // 0x1b = 8-byte unsigned header; non-shortest on the wire.
        let bytes = [
            0xa1, 0x04, 0x1b, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07,
        ];
        let env = decode(&bytes).unwrap();
        assert_eq!(env.u64(4), Some(7));
        // Re-encoding canonicalizes to the shortest form.
        assert_eq!(encode(&env).unwrap(), vec![0xa1, 0x04, 0x07]);
    }
}
