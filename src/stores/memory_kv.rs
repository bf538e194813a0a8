use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::stores::kv::KvBackend;

/// Minimum time between two sweeps of expired slots.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct Slot {
    bytes: Vec<u8>,
    expires: Option<Instant>,
}

impl Slot {
    fn new(bytes: Vec<u8>, ttl: Option<Duration>) -> Self {
        Slot {
            bytes,
            expires: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires.is_none_or(|expires| expires > now)
    }
}

struct State {
    slots: HashMap<String, Slot>,
    next_sweep: Instant,
}

impl State {
    /// Drop every expired slot, at most once per [`SWEEP_INTERVAL`].
    fn sweep(&mut self, now: Instant) {
        if now < self.next_sweep {
            return;
        }
        self.slots.retain(|_, slot| slot.is_live(now));
        self.next_sweep = now + SWEEP_INTERVAL;
    }
}

/// In-process byte map implementing [`KvBackend`].
///
/// Stands in for a remote key-value store: several [`KvStore`](crate::KvStore)s
/// wrapping one `Arc<MemoryBackend>` behave like processes sharing a Redis
/// instance, refresh locks included. Expired keys are removed when read and
/// swept periodically on writes.
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend {
            state: RwLock::new(State {
                slots: HashMap::new(),
                next_sweep: Instant::now() + SWEEP_INTERVAL,
            }),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.state
            .read()
            .await
            .slots
            .values()
            .filter(|slot| slot.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "kv:memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        {
            let state = self.state.read().await;
            match state.slots.get(key) {
                None => return Ok(None),
                Some(slot) if slot.is_live(now) => return Ok(Some(slot.bytes.clone())),
                Some(_) => {}
            }
        }

        let mut state = self.state.write().await;
        if state.slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            state.slots.remove(key);
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.sweep(Instant::now());
        state.slots.insert(key.to_string(), Slot::new(value, ttl));
        Ok(())
    }

    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut state = self.state.write().await;
        state.sweep(now);

        if state.slots.get(key).is_some_and(|slot| slot.is_live(now)) {
            return Ok(false);
        }

        state.slots.insert(key.to_string(), Slot::new(value, ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.slots.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_is_exclusive() {
        let backend = MemoryBackend::new();

        assert!(backend.create("k", b"a".to_vec(), None).await.unwrap());
        assert!(!backend.create("k", b"b".to_vec(), None).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(b"a".to_vec()));

        backend.delete("k").await.unwrap();
        assert!(backend.create("k", b"b".to_vec(), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_keys_are_invisible() {
        let backend = MemoryBackend::new();
        backend
            .put("k", b"a".to_vec(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(backend.len().await, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.is_empty().await);
        assert!(backend.create("k", b"b".to_vec(), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_key_is_removed_on_read() {
        let backend = MemoryBackend::new();
        backend
            .put("k", b"a".to_vec(), Some(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.get("k").await.unwrap().is_none());

        assert!(backend.state.read().await.slots.is_empty());
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_keys() {
        let backend = MemoryBackend::new();
        for i in 0..10 {
            backend
                .put(&format!("k{}", i), b"a".to_vec(), Some(Duration::from_millis(10)))
                .await
                .unwrap();
        }
        assert_eq!(backend.state.read().await.slots.len(), 10);

        tokio::time::sleep(SWEEP_INTERVAL + Duration::from_millis(50)).await;
        backend.put("fresh", b"b".to_vec(), None).await.unwrap();

        let state = backend.state.read().await;
        assert_eq!(state.slots.len(), 1);
        assert!(state.slots.contains_key("fresh"));
    }
}
