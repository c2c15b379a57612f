use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Expiring key/value store used for hot-path lookups such as mapping
/// configurations. Entries are lazily evicted: an expired entry is invisible
/// to `get` and removed on the next `purge_expired`.
pub struct TimedCache<K, V> {
    map: HashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K, V> TimedCache<K, V>
where
    K: std::hash::Hash + Eq,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key).and_then(|entry| {
            if Instant::now() < entry.expires_at {
                Some(&entry.value)
            } else {
                None
            }
        })
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.map.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key).map(|entry| entry.value)
    }

    pub fn purge_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| now < entry.expires_at);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Shared-state wrapper around [`TimedCache`] for concurrent use.
pub struct AsyncTimedCache<K, V> {
    inner: RwLock<TimedCache<K, V>>,
}

impl<K, V> AsyncTimedCache<K, V>
where
    K: std::hash::Hash + Eq,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(TimedCache::new(ttl)),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: K, value: V) {
        self.inner.write().await.insert(key, value);
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().await.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;

    use uuid::Uuid;

    use super::*;

    #[test]
    fn returns_value_before_expiry() {
        let mut cache: TimedCache<Uuid, String> = TimedCache::new(Duration::from_millis(100));
        let id = Uuid::new_v4();
        cache.insert(id, "users".to_string());
        assert_eq!(cache.get(&id), Some(&"users".to_string()));
    }

    #[test]
    fn hides_value_after_expiry() {
        let mut cache: TimedCache<Uuid, String> = TimedCache::new(Duration::from_millis(40));
        let id = Uuid::new_v4();
        cache.insert(id, "users".to_string());
        sleep(Duration::from_millis(50));
        assert_eq!(cache.get(&id), None);
    }

    #[test]
    fn remove_returns_the_entry() {
        let mut cache: TimedCache<Uuid, String> = TimedCache::new(Duration::from_secs(10));
        let id = Uuid::new_v4();
        cache.insert(id, "invoices".to_string());
        assert_eq!(cache.remove(&id), Some("invoices".to_string()));
        assert_eq!(cache.get(&id), None);
    }

    #[test]
    fn reinsert_refreshes_the_deadline() {
        let mut cache: TimedCache<Uuid, String> = TimedCache::new(Duration::from_millis(60));
        let id = Uuid::new_v4();
        cache.insert(id, "clients".to_string());
        sleep(Duration::from_millis(40));
        cache.insert(id, "clients".to_string());
        sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&id), Some(&"clients".to_string()));
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let mut cache: TimedCache<Uuid, String> = TimedCache::new(Duration::from_millis(40));
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        cache.insert(stale, "old".to_string());
        sleep(Duration::from_millis(50));
        cache.insert(fresh, "new".to_string());
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_empty());
        assert_eq!(cache.get(&fresh), Some(&"new".to_string()));
    }

    #[tokio::test]
    async fn async_cache_round_trip() {
        let cache: AsyncTimedCache<Uuid, String> = AsyncTimedCache::new(Duration::from_millis(100));
        let id = Uuid::new_v4();
        cache.insert(id, "projects".to_string()).await;
        assert_eq!(cache.get(&id).await, Some("projects".to_string()));
        assert_eq!(cache.remove(&id).await, Some("projects".to_string()));
        assert_eq!(cache.get(&id).await, None);
    }

    #[tokio::test]
    async fn async_cache_expires_entries() {
        let cache: AsyncTimedCache<Uuid, String> = AsyncTimedCache::new(Duration::from_millis(40));
        let id = Uuid::new_v4();
        cache.insert(id, "projects".to_string()).await;
        sleep(Duration::from_millis(50));
        assert_eq!(cache.get(&id).await, None);
    }
}
