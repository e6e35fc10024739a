// Key-value store contract for the ephemeral vault
// Any store honoring these semantics works (Redis in production); the
// in-memory implementation backs tests and single-process deployments

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::StoreError;

/// Redis-shaped contract: TTL values follow the Redis convention,
/// `-1` for a key without expiry, `-2` for a missing key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn del(&self, key: &str) -> Result<bool, StoreError>;
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory store with passive expiry: nothing deletes in the background,
/// expired entries are dropped when touched.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError("kv store lock poisoned".into()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        match entries.remove(key) {
            Some(entry) => Ok(!entry.expired()),
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(-2)
            }
            Some(entry) => match entry.expires_at {
                Some(at) => Ok(at.saturating_duration_since(Instant::now()).as_secs() as i64),
                None => Ok(-1),
            },
            None => Ok(-2),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        match entries.get_mut(key) {
            Some(entry) if !entry.expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setex_get_roundtrip() {
        let kv = MemoryKvStore::new();
        kv.setex("k", Duration::from_secs(60), "v").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_expiry_is_passive() {
        let kv = MemoryKvStore::new();
        kv.setex("k", Duration::from_millis(20), "v").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert_eq!(kv.ttl("k").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_ttl_conventions() {
        let kv = MemoryKvStore::new();
        assert_eq!(kv.ttl("missing").await.unwrap(), -2);
        kv.setex("k", Duration::from_secs(100), "v").await.unwrap();
        let remaining = kv.ttl("k").await.unwrap();
        assert!((90..=100).contains(&remaining));
    }

    #[tokio::test]
    async fn test_expire_refreshes_live_keys_only() {
        let kv = MemoryKvStore::new();
        assert!(!kv.expire("missing", Duration::from_secs(5)).await.unwrap());
        kv.setex("k", Duration::from_secs(5), "v").await.unwrap();
        assert!(kv.expire("k", Duration::from_secs(500)).await.unwrap());
        assert!(kv.ttl("k").await.unwrap() > 100);
    }

    #[tokio::test]
    async fn test_del_idempotent() {
        let kv = MemoryKvStore::new();
        kv.setex("k", Duration::from_secs(5), "v").await.unwrap();
        assert!(kv.del("k").await.unwrap());
        assert!(!kv.del("k").await.unwrap());
    }
}
