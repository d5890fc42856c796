//! Tagged CBOR value with coercing accessors.

/// A decoded CBOR data item.
///
/// Non-negative integers always decode to `UInt` regardless of how wide the
/// wire encoding was; `Int` holds strictly negative values. Map entries keep
/// their decode order; canonical ordering is applied at encode time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Signed read. Devices encode non-negative timestamps with major type 0,
    /// so unsigned values that fit in `i64` coerce rather than vanish.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up an unsigned integer key in a map value.
    pub fn map_get(&self, key: u64) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| matches!(k, Value::UInt(v) if *v == key))
            .map(|(_, v)| v)
    }

    /// Lossy conversion into JSON for free-form passthrough fields.
    ///
    /// Byte strings become base64, non-finite floats become null, and map
    /// keys are stringified.
    pub fn to_json(&self) -> serde_json::Value {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::UInt(v) => serde_json::Value::from(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => {
                let mut map = serde_json::Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = match k {
                        Value::Text(s) => s.clone(),
                        Value::UInt(n) => n.to_string(),
                        Value::Int(n) => n.to_string(),
                        other => format!("{other:?}"),
                    };
                    map.insert(key, v.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}
