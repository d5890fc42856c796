//! Read-only device registry: device id → Ed25519 verifying key, loaded
//! once at startup.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::VerifyingKey;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry file: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry is not a JSON object of devices: {0}")]
    Json(#[from] serde_json::Error),
    #[error("device {device_id}: invalid base64 public key")]
    Base64 {
        device_id: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Immutable for the process lifetime; share via `Arc`.
pub struct DeviceRegistry {
    keys: HashMap<String, VerifyingKey>,
}

impl DeviceRegistry {
    /// Load a JSON object mapping device id to either a base64 key string or
    /// an object with a `publicKeyB64` field. Entries of any other shape are
    /// skipped silently; undecodable base64 fails the whole load; keys that
    /// are not valid 32-byte Ed25519 points drop only their device.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = fs::read_to_string(path)?;
        let entries: HashMap<String, serde_json::Value> = serde_json::from_str(&raw)?;

        let mut keys = HashMap::with_capacity(entries.len());
        for (device_id, value) in entries {
            let encoded = match &value {
                serde_json::Value::String(s) => s.as_str(),
                serde_json::Value::Object(fields) => fields
                    .get("publicKeyB64")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default(),
                _ => continue,
            };
            let decoded = STANDARD.decode(encoded).map_err(|source| RegistryError::Base64 {
                device_id: device_id.clone(),
                source,
            })?;
            let Ok(bytes) = <[u8; 32]>::try_from(decoded.as_slice()) else {
                warn!(
                    device_id = %device_id,
                    key_len = decoded.len(),
                    "skipping device with wrong-length public key"
                );
                continue;
            };
            match VerifyingKey::from_bytes(&bytes) {
                Ok(key) => {
                    keys.insert(device_id, key);
                }
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "skipping device with invalid public key");
                }
            }
        }

        info!(devices = keys.len(), "loaded device registry");
        Ok(Self { keys })
    }

    pub fn verifying_key(&self, device_id: &str) -> Option<&VerifyingKey> {
        self.keys.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
