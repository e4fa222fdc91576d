use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A plain time-to-live cache: each entry carries its own expiry instant and
/// an expired entry reads as a miss. The cache is owned and consulted
/// explicitly by the caller; there is no eviction policy beyond TTL.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the cached value if it has not expired. Expired entries are
    /// dropped on access.
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some((expires_at, value)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (Instant::now() + self.ttl, value));
    }

    /// Drops every expired entry. Useful on idle ticks so a long-running
    /// session does not accumulate dead keys.
    pub fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, (expires_at, _)| now < *expires_at);
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_hits() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("AAPL".to_string(), 123.45_f64);
        assert_eq!(cache.get(&"AAPL".to_string()), Some(123.45));
        assert_eq!(cache.get(&"MSFT".to_string()), None);
    }

    #[test]
    fn expired_entry_misses_and_is_dropped() {
        let mut cache = TtlCache::new(Duration::ZERO);
        cache.insert("AAPL".to_string(), 1.0_f64);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"AAPL".to_string()), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn purge_drops_only_expired() {
        let mut expired = TtlCache::new(Duration::ZERO);
        expired.insert(1, "a");
        expired.purge_expired();
        assert_eq!(expired.len(), 0);

        let mut fresh = TtlCache::new(Duration::from_secs(60));
        fresh.insert(1, "a");
        fresh.purge_expired();
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", 1);
        cache.insert("k", 2);
        assert_eq!(cache.get(&"k"), Some(2));
        assert_eq!(cache.len(), 1);
    }
}
