//! Signed telemetry envelope: CBOR value model, canonical codec, content
//! hashing and Ed25519 verification.
//!
//! An envelope is a CBOR map keyed by small unsigned integers. Keys 10
//! (content hash) and 11 (signature) are integrity fields: the hash covers
//! the deterministic encoding of the envelope with both keys removed, and
//! the signature covers `"MYCO1" ‖ hash`.

pub mod codec;
pub mod crypto;
pub mod envelope;
pub mod value;
pub mod verify;

#[cfg(any(test, feature = "testing"))]
pub mod testkit;

pub use codec::{decode, encode, encode_canonical, CodecError};
pub use crypto::{content_hash, signing_message, SIGNING_DOMAIN};
pub use envelope::Envelope;
pub use value::Value;
pub use verify::{verify_envelope, VerifyError};

/// Envelope key assignments, fixed by the device firmware.
pub mod keys {
    pub const SCHEMA_VERSION: u64 = 0;
    pub const DEVICE_ID: u64 = 1;
    pub const PROTOCOL: u64 = 2;
    pub const MESSAGE_ID: u64 = 3;
    pub const TIMESTAMP_MS: u64 = 4;
    pub const SEQUENCE: u64 = 5;
    pub const MONOTONIC_MS: u64 = 6;
    pub const GEO: u64 = 7;
    pub const SENSOR_PACK: u64 = 8;
    pub const META: u64 = 9;
    pub const CONTENT_HASH: u64 = 10;
    pub const SIGNATURE: u64 = 11;
}
