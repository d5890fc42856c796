//! Envelope-level integrity checks.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;

use crate::codec::encode_canonical;
use crate::crypto::{content_hash, signing_message};
use crate::envelope::Envelope;
use crate::keys;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("missing hash")]
    MissingHash,
    #[error("missing signature")]
    MissingSignature,
    #[error("bad hash type/len")]
    BadHash,
    #[error("bad sig type/len")]
    BadSig,
    #[error("cbor re-encode failed")]
    Reencode,
    #[error("hash mismatch")]
    HashMismatch,
    #[error("bad signature")]
    BadSignature,
}

/// Verify an envelope against a device public key.
///
/// The hash is recomputed from the canonical image rather than trusted from
/// key 10; a matching key 10 only proves the sender derived the same image.
pub fn verify_envelope(env: &Envelope, pubkey: &VerifyingKey) -> Result<(), VerifyError> {
    let hash_field = env.get(keys::CONTENT_HASH).ok_or(VerifyError::MissingHash)?;
    let sig_field = env.get(keys::SIGNATURE).ok_or(VerifyError::MissingSignature)?;

    let claimed: [u8; 32] = hash_field
        .as_bytes()
        .and_then(|b| b.try_into().ok())
        .ok_or(VerifyError::BadHash)?;
    let sig_bytes: [u8; 64] = sig_field
        .as_bytes()
        .and_then(|b| b.try_into().ok())
        .ok_or(VerifyError::BadSig)?;

    let canonical = encode_canonical(env).map_err(|_| VerifyError::Reencode)?;
    let computed = content_hash(&canonical);
    if claimed != computed {
        return Err(VerifyError::HashMismatch);
    }

    let signature = Signature::from_bytes(&sig_bytes);
    pubkey
        .verify(&signing_message(&computed), &signature)
        .map_err(|_| VerifyError::BadSignature)
}
