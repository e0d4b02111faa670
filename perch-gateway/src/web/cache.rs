use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted: Instant,
}

/// Map whose entries expire `ttl` after insertion.
#[derive(Debug)]
pub struct TimedCache<K, V> {
    ttl: Duration,
    map: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            map: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let map = self.map.read().await;
        map.get(key)
            .filter(|entry| entry.inserted.elapsed() <= self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Insert `value`, dropping anything already expired.
    pub async fn set(&self, key: K, value: V) {
        let mut map = self.map.write().await;
        let ttl = self.ttl;
        map.retain(|_, entry| entry.inserted.elapsed() <= ttl);
        map.insert(
            key,
            CacheEntry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.map.read().await.len()
    }
}
