use dashmap::DashMap;
use std::{
    hash::Hash,
    time::{Duration, Instant},
};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Mapa concurrente cuyas entradas expiran tras un TTL fijo.
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V> {
    data: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            data: DashMap::new(),
            ttl,
            capacity,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        if self.data.len() >= self.capacity {
            self.cleanup_expired();
            // Sigue lleno: descartar la entrada que expira antes
            if self.data.len() >= self.capacity {
                let oldest = self
                    .data
                    .iter()
                    .min_by_key(|entry| entry.value().expires_at)
                    .map(|entry| entry.key().clone());
                if let Some(key) = oldest {
                    self.data.remove(&key);
                }
            }
        }

        self.data.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.data.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.data.remove(key);
            None
        } else {
            Some(entry.value.clone())
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elimina las entradas expiradas y devuelve cuántas eran.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_fresh_value() {
        let cache = TtlCache::new(4, Duration::from_secs(60));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = TtlCache::new(4, Duration::ZERO);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
        cache.insert("b", 2);
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_is_respected() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, "one");
        cache.insert(2, "two");
        cache.insert(3, "three");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&3), Some("three"));
    }
}
