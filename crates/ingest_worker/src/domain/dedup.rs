//! Best-effort duplicate suppression over a sliding TTL window.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Entry count above which a full expiry sweep runs before the next lookup.
const DEFAULT_SOFT_CAP: usize = 500_000;

/// The identity under which duplicates are suppressed:
/// `deviceId ":" base64(msgId)`.
pub fn dedup_key(device_id: &str, msg_id: &[u8]) -> String {
    format!("{device_id}:{}", STANDARD.encode(msg_id))
}

/// TTL-bounded set of seen keys. Memory is bounded only softly: pruning is
/// amortized into `seen` calls once the map outgrows the cap, so the map can
/// overshoot between sweeps, and nothing survives a process restart.
pub struct Deduper {
    ttl: Duration,
    soft_cap: usize,
    entries: Mutex<HashMap<String, Instant>>,
}

impl Deduper {
    pub fn new(ttl: Duration) -> Self {
        Self::with_soft_cap(ttl, DEFAULT_SOFT_CAP)
    }

    pub fn with_soft_cap(ttl: Duration, soft_cap: usize) -> Self {
        Self {
            ttl,
            soft_cap,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// First sight within the TTL records the key and returns `false`.
    /// Re-sights within the TTL return `true` without touching the stored
    /// timestamp. A sight after expiry refreshes the timestamp and returns
    /// `false`.
    pub fn seen(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        if entries.len() > self.soft_cap {
            entries.retain(|_, at| now.duration_since(*at) <= self.ttl);
        }

        if let Some(at) = entries.get(key) {
            if now.duration_since(*at) <= self.ttl {
                return true;
            }
        }
        entries.insert(key.to_owned(), now);
        false
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn first_sight_records_and_repeat_suppresses() {
        let dedup = Deduper::new(Duration::from_secs(60));
        assert!(!dedup.seen("d1:abc"));
        assert!(dedup.seen("d1:abc"));
        assert!(dedup.seen("d1:abc"));
        assert!(!dedup.seen("d1:other"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn sight_after_expiry_is_fresh_again() {
        let dedup = Deduper::new(Duration::from_millis(10));
        assert!(!dedup.seen("k"));
        sleep(Duration::from_millis(25));
        assert!(!dedup.seen("k"));
        // The refresh restarted the window.
        assert!(dedup.seen("k"));
    }

    #[test]
    fn sweep_above_the_soft_cap_evicts_expired_entries() {
        let dedup = Deduper::with_soft_cap(Duration::from_millis(10), 2);
        assert!(!dedup.seen("a"));
        assert!(!dedup.seen("b"));
        assert!(!dedup.seen("c"));
        assert_eq!(dedup.len(), 3);

        sleep(Duration::from_millis(25));
        assert!(!dedup.seen("d"));
        // a, b, c were expired and swept before the lookup.
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn sweep_keeps_live_entries() {
        let dedup = Deduper::with_soft_cap(Duration::from_secs(60), 2);
        assert!(!dedup.seen("a"));
        assert!(!dedup.seen("b"));
        assert!(!dedup.seen("c"));
        assert!(!dedup.seen("d"));
        assert_eq!(dedup.len(), 4);
        assert!(dedup.seen("a"));
    }

    #[test]
    fn dedup_key_concatenates_device_and_encoded_id() {
        assert_eq!(dedup_key("d1", &[0x01, 0x02, 0x03]), "d1:AQID");
        assert_eq!(dedup_key("d1", &[]), "d1:");
    }
}
