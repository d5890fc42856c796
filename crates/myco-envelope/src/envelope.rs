//! Top-level envelope map with keyed accessors.

use crate::value::Value;

/// A decoded telemetry envelope: a CBOR map keyed by small unsigned
/// integers. Accessors coerce on read and return `None` when a key is
/// missing or carries an unexpected type; callers pick their own zero
/// values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    entries: Vec<(Value, Value)>,
}

impl Envelope {
    pub fn from_entries(entries: Vec<(Value, Value)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    /// Insert or replace the value under an unsigned integer key.
    pub fn insert(&mut self, key: u64, value: Value) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(k, _)| matches!(k, Value::UInt(v) if *v == key))
        {
            slot.1 = value;
        } else {
            self.entries.push((Value::UInt(key), value));
        }
    }

    pub fn get(&self, key: u64) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, Value::UInt(v) if *v == key))
            .map(|(_, v)| v)
    }

    pub fn u64(&self, key: u64) -> Option<u64> {
        self.get(key)?.as_u64()
    }

    pub fn i64(&self, key: u64) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    pub fn bytes(&self, key: u64) -> Option<&[u8]> {
        self.get(key)?.as_bytes()
    }

    pub fn text(&self, key: u64) -> Option<&str> {
        self.get(key)?.as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;

    #[test]
    fn accessors_return_none_on_missing_or_mistyped() {
        let mut env = Envelope::default();
        env.insert(keys::DEVICE_ID, Value::Text("d1".into()));
        env.insert(keys::SEQUENCE, Value::Text("not a number".into()));

        assert_eq!(env.text(keys::DEVICE_ID), Some("d1"));
        assert_eq!(env.u64(keys::SEQUENCE), None);
        assert_eq!(env.bytes(keys::MESSAGE_ID), None);
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut env = Envelope::default();
        env.insert(0, Value::UInt(1));
        env.insert(0, Value::UInt(2));
        assert_eq!(env.entries().len(), 1);
        assert_eq!(env.u64(0), Some(2));
    }
}
