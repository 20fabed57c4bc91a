//! Request-time device resolution
//!
//! `get_device_list` answers "which devices may own this DevAddr, with
//! credentials" for join handling and for the first data frame seen on an
//! address. The shared bucket is the fast path; the registry is only touched
//! to fill gaps, and a per-DevAddr lease makes the cache-miss lookup
//! single-flight across the whole cluster: one process queries, everyone
//! else polls the bucket it is about to populate.
//!
//! An address the registry does not know gets a negative entry so repeated
//! uplinks from foreign networks stop costing registry calls. An empty
//! result therefore always means "not our device"; operational failures
//! surface as errors instead.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use chrono::Utc;
use lns_core::device::{DevAddrCacheInfo, HubDeviceInfo};
use lns_core::identifiers::{DevAddr, DevNonce, StationEui};

use crate::config::GetterConfig;
use crate::error::{Result, StateError};
use crate::registry::DeviceRegistry;
use crate::store::{Bucket, DevAddrCacheStore};

/// Getter statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct GetterStats {
    /// Calls answered from a populated bucket
    pub cache_hits: u64,
    /// Calls that found an empty bucket
    pub cache_misses: u64,
    /// Calls answered by a negative entry
    pub negative_hits: u64,
    /// `find_by_addr` round-trips this process performed
    pub registry_lookups: u64,
    /// Credentials fetched lazily via `get_device`
    pub keys_fetched: u64,
    /// Calls that waited on another resolver instead of querying
    pub coalesced_waits: u64,
}

/// Resolves DevAddr -> device list, mediating the cache and the registry
pub struct DeviceGetter {
    store: DevAddrCacheStore,
    registry: Arc<dyn DeviceRegistry>,
    config: GetterConfig,
    stats: RwLock<GetterStats>,
}

impl DeviceGetter {
    pub fn new(store: DevAddrCacheStore, registry: Arc<dyn DeviceRegistry>) -> Self {
        Self::with_config(store, registry, GetterConfig::default())
    }

    pub fn with_config(
        store: DevAddrCacheStore,
        registry: Arc<dyn DeviceRegistry>,
        config: GetterConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            stats: RwLock::new(GetterStats::default()),
        }
    }

    /// Resolve the devices that may own `dev_addr`, with credentials,
    /// filtered to those serving `gateway_id`.
    pub async fn get_device_list(
        &self,
        station: Option<StationEui>,
        gateway_id: &str,
        dev_nonce: DevNonce,
        dev_addr: DevAddr,
    ) -> Result<Vec<HubDeviceInfo>> {
        trace!(?station, %dev_nonce, %dev_addr, gateway_id, "resolving device list");

        let bucket = self.store.get_bucket(dev_addr).await?;
        if !bucket.is_empty() {
            self.stats.write().cache_hits += 1;
            return self.resolve_from_bucket(bucket, gateway_id, dev_addr).await;
        }
        self.stats.write().cache_misses += 1;

        // Cache miss: exactly one resolver per DevAddr per window, cluster-wide
        let lease = DevAddrCacheStore::devaddr_lease_key(dev_addr);
        let deadline = Instant::now() + self.config.resolve_timeout;
        let mut waited = false;
        loop {
            if self
                .store
                .take_lease(&lease, self.config.devaddr_lease_ttl)
                .await?
            {
                let result = self.populate_from_registry(dev_addr, gateway_id).await;
                if let Err(err) = self.store.release_lease(&lease).await {
                    warn!(%dev_addr, %err, "failed to release devaddr lease");
                }
                return result;
            }

            if !waited {
                self.stats.write().coalesced_waits += 1;
                waited = true;
            }
            debug!(%dev_addr, "another resolver owns this address; waiting");

            // Poll until the owner populates the bucket or lets the lease go
            loop {
                sleep(self.config.poll_interval).await;
                let bucket = self.store.get_bucket(dev_addr).await?;
                if !bucket.is_empty() {
                    return self.resolve_from_bucket(bucket, gateway_id, dev_addr).await;
                }
                if !self.store.lease_held(&lease).await? {
                    // owner finished empty-handed or died; take over
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(StateError::Timeout {
                        waited_ms: self.config.resolve_timeout.as_millis() as u64,
                    });
                }
            }
            if Instant::now() >= deadline {
                return Err(StateError::Timeout {
                    waited_ms: self.config.resolve_timeout.as_millis() as u64,
                });
            }
        }
    }

    pub fn stats(&self) -> GetterStats {
        self.stats.read().clone()
    }

    /// Answer from a populated bucket, fetching any missing credentials
    /// one device at a time; never touches `find_by_addr` or `get_twin`.
    async fn resolve_from_bucket(
        &self,
        bucket: Bucket,
        gateway_id: &str,
        dev_addr: DevAddr,
    ) -> Result<Vec<HubDeviceInfo>> {
        if bucket.len() == 1 && bucket.values().next().is_some_and(|e| e.is_negative()) {
            debug!(%dev_addr, "negative cache hit");
            self.stats.write().negative_hits += 1;
            return Ok(Vec::new());
        }

        let mut devices = Vec::new();
        for info in bucket.into_values() {
            let Some(dev_eui) = info.dev_eui else {
                continue;
            };
            if !info.matches_gateway(gateway_id) {
                continue;
            }
            let mut info = info;
            if !info.has_primary_key() {
                if let Some(creds) = self.registry.get_device(dev_eui).await? {
                    info.primary_key = Some(creds.primary_key);
                    self.store.put_entry(dev_addr, &info).await?;
                    self.stats.write().keys_fetched += 1;
                } else {
                    warn!(%dev_eui, "device vanished from registry; returned without key");
                }
            }
            if let Some(device) = HubDeviceInfo::from_cache_info(&info) {
                devices.push(device);
            }
        }
        devices.sort_by_key(|device| device.dev_eui);
        Ok(devices)
    }

    /// Single-flight owner path: one `find_by_addr`, keys for the matching
    /// candidates, then one atomic bucket write.
    async fn populate_from_registry(
        &self,
        dev_addr: DevAddr,
        gateway_id: &str,
    ) -> Result<Vec<HubDeviceInfo>> {
        debug!(%dev_addr, "bucket empty; querying registry");
        // a failure here propagates without a negative entry,
        // so the next call retries
        let twins = self.registry.find_by_addr(dev_addr).await?;
        self.stats.write().registry_lookups += 1;

        if twins.is_empty() {
            debug!(%dev_addr, "registry has no device on this address");
            let negative = DevAddrCacheInfo::negative(dev_addr, Utc::now());
            let mut bucket = Bucket::new();
            bucket.insert(negative.field_key(), negative);
            self.store.replace_bucket(dev_addr, &bucket).await?;
            return Ok(Vec::new());
        }

        let mut bucket = Bucket::new();
        for twin in twins {
            let Some(mut info) = twin.to_cache_info() else {
                continue;
            };
            // only the candidates this request needs get their key now;
            // the rest stay keyless until someone asks for them
            if info.matches_gateway(gateway_id) {
                if let Some(creds) = self.registry.get_device(twin.dev_eui).await? {
                    info.primary_key = Some(creds.primary_key);
                    self.stats.write().keys_fetched += 1;
                }
            }
            bucket.insert(info.field_key(), info);
        }
        self.store.replace_bucket(dev_addr, &bucket).await?;

        let mut devices: Vec<HubDeviceInfo> = bucket
            .values()
            .filter(|info| info.matches_gateway(gateway_id))
            .filter_map(HubDeviceInfo::from_cache_info)
            .collect();
        devices.sort_by_key(|device| device.dev_eui);
        Ok(devices)
    }
}
