//! Envelope construction and sealing helpers for tests and fixtures.

use ed25519_dalek::{Signer, SigningKey};

use crate::codec::encode_canonical;
use crate::crypto::{content_hash, signing_message};
use crate::envelope::Envelope;
use crate::keys;
use crate::value::Value;

/// Deterministic keypair from a one-byte seed.
pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// A well-formed unsigned envelope with the fixture values used across the
/// workspace tests: device "d1", mqtt, a known message id and wall clock.
pub fn sample_envelope() -> Envelope {
    let mut env = Envelope::default();
    env.insert(keys::SCHEMA_VERSION, Value::UInt(1));
    env.insert(keys::DEVICE_ID, Value::Text("d1".into()));
    env.insert(keys::PROTOCOL, Value::UInt(2));
    env.insert(
        keys::MESSAGE_ID,
        Value::Bytes(vec![
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ]),
    );
    env.insert(keys::TIMESTAMP_MS, Value::UInt(1_700_000_000_000));
    env.insert(keys::SEQUENCE, Value::UInt(7));
    env.insert(keys::MONOTONIC_MS, Value::UInt(12345));
    env
}

/// Hash and sign an envelope the way device firmware does: BLAKE2b-256 over
/// the canonical image, Ed25519 over `"MYCO1" ‖ hash`, results stored under
/// keys 10 and 11.
pub fn seal(mut env: Envelope, key: &SigningKey) -> Envelope {
    let canonical = encode_canonical(&env).expect("fixture envelope encodes");
    let hash = content_hash(&canonical);
    let signature = key.sign(&signing_message(&hash));
    env.insert(keys::CONTENT_HASH, Value::Bytes(hash.to_vec()));
    env.insert(keys::SIGNATURE, Value::Bytes(signature.to_bytes().to_vec()));
    env
}
