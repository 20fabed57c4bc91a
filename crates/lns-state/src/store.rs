//! Typed DevAddr cache over the key-value store
//!
//! Key layout in the shared store:
//!
//! - `devAddrTable:<DevAddr>` — hash of `<DevEui> -> DevAddrCacheInfo`
//!   (JSON); a single field with an empty name is the negative entry
//! - `fullUpdateKey` — lease; present while a full reload runs or cools down
//! - `globalUpdateKey` — lease; present while any sync runs
//! - `<DevAddr>` — short lease coalescing cache misses across processes
//!
//! The store surfaces every KV error to the caller and never retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use lns_core::device::DevAddrCacheInfo;
use lns_core::identifiers::DevAddr;

use crate::error::Result;
use crate::kv::KeyValueStore;

/// Prefix of the per-DevAddr hash keys
pub const DEVADDR_TABLE_PREFIX: &str = "devAddrTable:";
/// Lease guarding (and cooling down) full reloads, cluster-wide
pub const FULL_UPDATE_LEASE: &str = "fullUpdateKey";
/// Lease guarding any running synchronisation, cluster-wide
pub const GLOBAL_UPDATE_LEASE: &str = "globalUpdateKey";

/// One DevAddr bucket: hash field -> entry
pub type Bucket = HashMap<String, DevAddrCacheInfo>;

/// Typed wrapper over the distributed store for the DevAddr cache
#[derive(Clone)]
pub struct DevAddrCacheStore {
    kv: Arc<dyn KeyValueStore>,
    bucket_ttl: Duration,
}

impl DevAddrCacheStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            bucket_ttl: Duration::from_secs(25 * 60 * 60),
        }
    }

    pub fn with_bucket_ttl(mut self, bucket_ttl: Duration) -> Self {
        self.bucket_ttl = bucket_ttl;
        self
    }

    /// Hash key of one DevAddr bucket
    pub fn bucket_key(dev_addr: DevAddr) -> String {
        format!("{DEVADDR_TABLE_PREFIX}{dev_addr}")
    }

    /// Lease key coalescing cache misses for one DevAddr
    pub fn devaddr_lease_key(dev_addr: DevAddr) -> String {
        dev_addr.to_string()
    }

    /// Read a whole bucket. A field that does not deserialise is skipped and
    /// treated as absent; the next sync rewrites it.
    pub async fn get_bucket(&self, dev_addr: DevAddr) -> Result<Bucket> {
        let raw = self.kv.hget_all(&Self::bucket_key(dev_addr)).await?;
        let mut bucket = Bucket::with_capacity(raw.len());
        for (field, value) in raw {
            match serde_json::from_str::<DevAddrCacheInfo>(&value) {
                Ok(info) => {
                    bucket.insert(field, info);
                }
                Err(err) => {
                    warn!(%dev_addr, field, %err, "malformed cache entry skipped");
                }
            }
        }
        Ok(bucket)
    }

    /// Upsert one entry in a bucket
    pub async fn put_entry(&self, dev_addr: DevAddr, info: &DevAddrCacheInfo) -> Result<()> {
        let key = Self::bucket_key(dev_addr);
        let value = serde_json::to_string(info)?;
        self.kv.hset(&key, &info.field_key(), &value).await?;
        self.kv.expire(&key, self.bucket_ttl).await
    }

    /// Atomically swap the entire bucket
    pub async fn replace_bucket(&self, dev_addr: DevAddr, bucket: &Bucket) -> Result<()> {
        let key = Self::bucket_key(dev_addr);
        let mut entries = HashMap::with_capacity(bucket.len());
        for (field, info) in bucket {
            entries.insert(field.clone(), serde_json::to_string(info)?);
        }
        self.kv.hset_all(&key, entries).await?;
        self.kv.expire(&key, self.bucket_ttl).await
    }

    /// List the DevAddrs that currently have a bucket
    pub async fn bucket_addrs(&self) -> Result<Vec<String>> {
        let keys = self.kv.scan_keys(DEVADDR_TABLE_PREFIX).await?;
        Ok(keys
            .into_iter()
            .map(|key| key[DEVADDR_TABLE_PREFIX.len()..].to_string())
            .collect())
    }

    /// Atomically take a named lease; true if this caller now holds it
    pub async fn take_lease(&self, name: &str, ttl: Duration) -> Result<bool> {
        self.kv.set_if_absent(name, "locked", ttl).await
    }

    /// Drop a named lease
    pub async fn release_lease(&self, name: &str) -> Result<()> {
        self.kv.del(name).await
    }

    /// Whether a named lease is currently held by anyone
    pub async fn lease_held(&self, name: &str) -> Result<bool> {
        Ok(self.kv.get(name).await?.is_some())
    }

    /// Remaining TTL of a named lease, if held
    pub async fn get_lease_ttl(&self, name: &str) -> Result<Option<Duration>> {
        self.kv.ttl(name).await
    }

    /// Cut a lease's TTL down to `ttl` if it currently lives longer
    pub async fn shorten_lease(&self, name: &str, ttl: Duration) -> Result<()> {
        match self.kv.ttl(name).await? {
            Some(current) if current > ttl => self.kv.expire(name, ttl).await,
            _ => Ok(()),
        }
    }
}
