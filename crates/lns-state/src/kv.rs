//! Key-value store abstraction
//!
//! The distributed store is the only cross-process coordination primitive in
//! this layer, consumed through the [`KeyValueStore`] capability trait:
//! strings with TTL and set-if-absent (atomic leases), hashes with atomic
//! whole-hash replace, and TTL inspection. Errors surface as
//! [`StateError::Kv`]; nothing at this layer retries.
//!
//! [`MemoryKvStore`] gives the same semantics on a single node and backs the
//! test harness.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::{Result, StateError};

/// Capability trait over the distributed key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a string key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string key, with an optional expiry
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomically write a string key only if it does not exist; the lease
    /// primitive. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete a key of any kind
    async fn del(&self, key: &str) -> Result<()>;

    /// Remaining time to live, if the key exists and carries an expiry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Replace the expiry of an existing key; no-op if the key is absent
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Read all fields of a hash key; empty map if absent
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Upsert one field of a hash key
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Atomically replace the entire hash
    async fn hset_all(&self, key: &str, entries: HashMap<String, String>) -> Result<()>;

    /// List live keys starting with `prefix`
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
enum SlotValue {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: SlotValue,
    expires_at: Option<Instant>,
}

impl Slot {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process [`KeyValueStore`] with the coordination semantics of the
/// distributed store on a single node
///
/// Expiry is enforced lazily on access. All operations are atomic under one
/// mutex, which is what makes `set_if_absent` a usable lease primitive.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(slots: &'a mut HashMap<String, Slot>, key: &str) -> Option<&'a mut Slot> {
        let now = Instant::now();
        if slots.get(key).is_some_and(|slot| slot.expired(now)) {
            trace!(key, "expired key purged");
            slots.remove(key);
        }
        slots.get_mut(key)
    }

    fn wrong_type(key: &str) -> StateError {
        StateError::Kv(format!(
            "WRONGTYPE operation against key '{key}' holding the other kind of value"
        ))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut slots = self.slots.lock();
        match Self::live(&mut slots, key) {
            Some(slot) => match &slot.value {
                SlotValue::Text(value) => Ok(Some(value.clone())),
                SlotValue::Hash(_) => Err(Self::wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut slots = self.slots.lock();
        slots.insert(
            key.to_string(),
            Slot {
                value: SlotValue::Text(value.to_string()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut slots = self.slots.lock();
        if Self::live(&mut slots, key).is_some() {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot {
                value: SlotValue::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.slots.lock().remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut slots = self.slots.lock();
        Ok(Self::live(&mut slots, key).and_then(|slot| {
            slot.expires_at
                .map(|at| at.saturating_duration_since(Instant::now()))
        }))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut slots = self.slots.lock();
        if let Some(slot) = Self::live(&mut slots, key) {
            slot.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut slots = self.slots.lock();
        match Self::live(&mut slots, key) {
            Some(slot) => match &slot.value {
                SlotValue::Hash(entries) => Ok(entries.clone()),
                SlotValue::Text(_) => Err(Self::wrong_type(key)),
            },
            None => Ok(HashMap::new()),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut slots = self.slots.lock();
        match Self::live(&mut slots, key) {
            Some(slot) => match &mut slot.value {
                SlotValue::Hash(entries) => {
                    entries.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                SlotValue::Text(_) => Err(Self::wrong_type(key)),
            },
            None => {
                let mut entries = HashMap::new();
                entries.insert(field.to_string(), value.to_string());
                slots.insert(
                    key.to_string(),
                    Slot {
                        value: SlotValue::Hash(entries),
                        expires_at: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn hset_all(&self, key: &str, entries: HashMap<String, String>) -> Result<()> {
        let mut slots = self.slots.lock();
        slots.insert(
            key.to_string(),
            Slot {
                value: SlotValue::Hash(entries),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut slots = self.slots.lock();
        let now = Instant::now();
        slots.retain(|_, slot| !slot.expired(now));
        Ok(slots
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_string_roundtrip() {
        let kv = MemoryKvStore::new();
        assert_eq!(kv.get("a").await.unwrap(), None);
        kv.set("a", "1", None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some("1".to_string()));
        kv.del("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_if_absent_is_a_lease() {
        let kv = MemoryKvStore::new();
        let ttl = Duration::from_secs(5);
        assert!(kv.set_if_absent("lease", "me", ttl).await.unwrap());
        assert!(!kv.set_if_absent("lease", "you", ttl).await.unwrap());
        // The holder's value stayed
        assert_eq!(kv.get("lease").await.unwrap(), Some("me".to_string()));
    }

    #[tokio::test]
    async fn test_expiry_frees_the_lease() {
        let kv = MemoryKvStore::new();
        let ttl = Duration::from_millis(20);
        assert!(kv.set_if_absent("lease", "me", ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(kv.set_if_absent("lease", "you", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_and_expire() {
        let kv = MemoryKvStore::new();
        kv.set("k", "v", Some(Duration::from_secs(100))).await.unwrap();
        let remaining = kv.ttl("k").await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(100));
        assert!(remaining > Duration::from_secs(90));

        kv.expire("k", Duration::from_secs(5)).await.unwrap();
        let remaining = kv.ttl("k").await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(5));

        // expire on a missing key is a no-op
        kv.expire("missing", Duration::from_secs(5)).await.unwrap();
        assert_eq!(kv.ttl("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let kv = MemoryKvStore::new();
        assert!(kv.hget_all("h").await.unwrap().is_empty());

        kv.hset("h", "f1", "v1").await.unwrap();
        kv.hset("h", "f2", "v2").await.unwrap();
        let all = kv.hget_all("h").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["f1"], "v1");

        let mut replacement = HashMap::new();
        replacement.insert("f3".to_string(), "v3".to_string());
        kv.hset_all("h", replacement).await.unwrap();
        let all = kv.hget_all("h").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["f3"], "v3");
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let kv = MemoryKvStore::new();
        kv.set("s", "v", None).await.unwrap();
        assert!(kv.hget_all("s").await.is_err());
        assert!(kv.hset("s", "f", "v").await.is_err());

        kv.hset("h", "f", "v").await.unwrap();
        assert!(kv.get("h").await.is_err());
    }

    #[tokio::test]
    async fn test_scan_keys() {
        let kv = MemoryKvStore::new();
        kv.set("p:1", "a", None).await.unwrap();
        kv.set("p:2", "b", Some(Duration::from_millis(10))).await.unwrap();
        kv.set("q:1", "c", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut keys = kv.scan_keys("p:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["p:1".to_string()]);
    }
}
