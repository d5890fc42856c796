//! Content hashing and the signing message layout.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// BLAKE2b with a 256-bit output, unkeyed.
pub type Blake2b256 = Blake2b<U32>;

/// Domain-separation prefix prepended to the content hash before signing.
pub const SIGNING_DOMAIN: &[u8; 5] = b"MYCO1";

/// Hash of the canonical envelope image.
pub fn content_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// The exact byte sequence devices sign: `"MYCO1" ‖ hash`.
pub fn signing_message(hash: &[u8; 32]) -> [u8; 37] {
    let mut msg = [0u8; 37];
    msg[..SIGNING_DOMAIN.len()].copy_from_slice(SIGNING_DOMAIN);
    msg[SIGNING_DOMAIN.len()..].copy_from_slice(hash);
    msg
}
