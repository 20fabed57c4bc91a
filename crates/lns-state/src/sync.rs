//! Registry synchronisation
//!
//! Reconciles the shared DevAddr cache with the authoritative registry.
//! Two named leases coordinate the cluster:
//!
//! - `fullUpdateKey`, long-lived: whoever takes it runs a full reload, and
//!   its TTL doubles as the cool-down before anyone runs the next one. A
//!   failed reload shortens it to the retry TTL instead of releasing it.
//! - `globalUpdateKey`, short-lived: held while any reload (full or delta)
//!   is actually running.
//!
//! Every exit path funnels through the same cleanup: the global lease never
//! outlives the sync, and the full lease survives at its long TTL only when
//! the reload succeeded. Lease contention is a normal outcome, not an error.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use lns_core::device::DevAddrCacheInfo;
use lns_core::identifiers::DevAddr;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::registry::{DeviceRegistry, DeviceTwin};
use crate::store::{Bucket, DevAddrCacheStore, FULL_UPDATE_LEASE, GLOBAL_UPDATE_LEASE};

/// What a `perform_needed_syncs` call ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// This node ran a full reload
    Full,
    /// This node ran a delta reload
    Delta,
    /// Another node owns the work; nothing to do here
    Skipped,
}

/// How to treat cached entries the incoming set does not mention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergePolicy {
    /// Full reload: the incoming set is complete, unseen entries go
    DiscardUnseen,
    /// Delta reload: the incoming set is partial, unseen entries stay
    RetainUnseen,
}

/// Synchronisation statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub full_reloads: u64,
    pub delta_reloads: u64,
    pub skipped: u64,
    pub failures: u64,
    pub buckets_replaced: u64,
    pub entries_merged: u64,
    pub primary_keys_preserved: u64,
    pub primary_keys_cleared: u64,
    /// Buckets present in the cache but absent from a full reload's view;
    /// they are left to their TTL rather than deleted
    pub stale_buckets_seen: u64,
}

/// Lock-guarded full and delta synchronisation of the DevAddr cache
pub struct DevAddrSynchroniser {
    store: DevAddrCacheStore,
    registry: Arc<dyn DeviceRegistry>,
    config: SyncConfig,
    /// Baseline for the next delta query
    last_sync: RwLock<Option<DateTime<Utc>>>,
    stats: RwLock<SyncStats>,
}

impl DevAddrSynchroniser {
    pub fn new(store: DevAddrCacheStore, registry: Arc<dyn DeviceRegistry>) -> Self {
        Self::with_config(store, registry, SyncConfig::default())
    }

    pub fn with_config(
        store: DevAddrCacheStore,
        registry: Arc<dyn DeviceRegistry>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            last_sync: RwLock::new(None),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Initial cache warm-up: one delta pass applied without taking leases.
    ///
    /// Kept out of the constructor so that building a synchroniser never
    /// blocks on the registry, and so callers can observe the warm-up query
    /// separately from the periodic ones.
    pub async fn warm_up(&self) -> Result<usize> {
        let started = Utc::now();
        let since = self.delta_baseline();
        debug!(%since, "warming devaddr cache");
        let twins = self.registry.find_by_last_update_date(since).await?;
        let devices = self.apply_twins(twins, MergePolicy::RetainUnseen).await?;
        *self.last_sync.write() = Some(started);
        info!(devices, "devaddr cache warm-up complete");
        Ok(devices)
    }

    /// Run whatever synchronisation this node is entitled to right now
    pub async fn perform_needed_syncs(&self) -> Result<SyncOutcome> {
        if self
            .store
            .take_lease(FULL_UPDATE_LEASE, self.config.full_reload_cooldown)
            .await?
        {
            return self.full_reload_under_leases().await;
        }
        if self
            .store
            .take_lease(GLOBAL_UPDATE_LEASE, self.config.global_lease_ttl)
            .await?
        {
            return self.delta_reload_under_lease().await;
        }
        debug!("another node owns the synchronisation work");
        self.stats.write().skipped += 1;
        Ok(SyncOutcome::Skipped)
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Baseline for the delta query, padded backwards to absorb clock skew
    fn delta_baseline(&self) -> DateTime<Utc> {
        let overlap = chrono::Duration::seconds(self.config.delta_overlap.as_secs() as i64);
        match *self.last_sync.read() {
            Some(at) => at - overlap,
            None => Utc::now() - overlap,
        }
    }

    async fn full_reload_under_leases(&self) -> Result<SyncOutcome> {
        // A full reload must also hold the global lease so no delta
        // interleaves with the bucket swaps.
        match self
            .store
            .take_lease(GLOBAL_UPDATE_LEASE, self.config.global_lease_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!("global lease busy; full reload deferred");
                self.surrender_full_lease().await;
                self.stats.write().skipped += 1;
                return Ok(SyncOutcome::Skipped);
            }
            Err(err) => {
                self.surrender_full_lease().await;
                return Err(err);
            }
        }

        let started = Utc::now();
        let result = self.full_reload().await;
        self.release_global_lease().await;
        match result {
            Ok(devices) => {
                *self.last_sync.write() = Some(started);
                self.stats.write().full_reloads += 1;
                info!(devices, "full reload complete");
                Ok(SyncOutcome::Full)
            }
            Err(err) => {
                // keep the lease, but make the retry fast
                self.surrender_full_lease().await;
                self.stats.write().failures += 1;
                warn!(%err, "full reload failed");
                Err(err)
            }
        }
    }

    async fn delta_reload_under_lease(&self) -> Result<SyncOutcome> {
        let started = Utc::now();
        let result = self.delta_reload().await;
        self.release_global_lease().await;
        match result {
            Ok(devices) => {
                *self.last_sync.write() = Some(started);
                self.stats.write().delta_reloads += 1;
                info!(devices, "delta reload complete");
                Ok(SyncOutcome::Delta)
            }
            Err(err) => {
                self.stats.write().failures += 1;
                warn!(%err, "delta reload failed");
                Err(err)
            }
        }
    }

    async fn full_reload(&self) -> Result<usize> {
        let twins = self.registry.find_configured_lora_devices().await?;
        debug!(twins = twins.len(), "rebuilding devaddr table");

        let incoming_addrs: HashSet<String> = twins
            .iter()
            .filter_map(|twin| twin.dev_addr)
            .map(|addr| addr.to_string())
            .collect();
        let stale = self
            .store
            .bucket_addrs()
            .await?
            .into_iter()
            .filter(|addr| !incoming_addrs.contains(addr))
            .count();
        if stale > 0 {
            // not deleted: they age out via the bucket TTL
            self.stats.write().stale_buckets_seen += stale as u64;
            debug!(stale, "buckets absent from registry left to expire");
        }

        self.apply_twins(twins, MergePolicy::DiscardUnseen).await
    }

    async fn delta_reload(&self) -> Result<usize> {
        let since = self.delta_baseline();
        debug!(%since, "querying registry for changed devices");
        let twins = self.registry.find_by_last_update_date(since).await?;
        self.apply_twins(twins, MergePolicy::RetainUnseen).await
    }

    /// Group incoming twins per DevAddr and rewrite each touched bucket
    async fn apply_twins(&self, twins: Vec<DeviceTwin>, policy: MergePolicy) -> Result<usize> {
        let mut by_addr: HashMap<DevAddr, Vec<DevAddrCacheInfo>> = HashMap::new();
        let mut devices = 0;
        for twin in twins {
            match twin.to_cache_info() {
                Some(info) => {
                    by_addr.entry(info.dev_addr).or_default().push(info);
                    devices += 1;
                }
                None => trace!(dev_eui = %twin.dev_eui, "twin without address skipped"),
            }
        }

        for (addr, incoming) in by_addr {
            let existing = self.store.get_bucket(addr).await?;
            let merged = self.merge_bucket(&existing, incoming, policy);
            self.store.replace_bucket(addr, &merged).await?;
            self.stats.write().buckets_replaced += 1;
        }
        Ok(devices)
    }

    /// Merge incoming entries over one existing bucket.
    ///
    /// A twin whose timestamp matches the cached one has not changed in the
    /// registry, so the credential we already fetched for it stays valid.
    /// Any other incoming entry loses its credential; the getter re-fetches
    /// lazily.
    fn merge_bucket(
        &self,
        existing: &Bucket,
        incoming: Vec<DevAddrCacheInfo>,
        policy: MergePolicy,
    ) -> Bucket {
        let mut merged = match policy {
            MergePolicy::RetainUnseen => existing.clone(),
            MergePolicy::DiscardUnseen => Bucket::new(),
        };
        let mut stats = self.stats.write();
        for mut info in incoming {
            let field = info.field_key();
            match existing.get(&field) {
                Some(old) if old.last_updated == info.last_updated => {
                    info.primary_key = old.primary_key.clone();
                    stats.primary_keys_preserved += 1;
                }
                Some(_) => {
                    info.primary_key = None;
                    stats.primary_keys_cleared += 1;
                }
                None => {
                    info.primary_key = None;
                }
            }
            merged.insert(field, info);
            stats.entries_merged += 1;
        }
        // a real device entry supersedes a negative marker
        if merged.len() > 1 {
            merged.remove("");
        }
        merged
    }

    async fn release_global_lease(&self) {
        if let Err(err) = self.store.release_lease(GLOBAL_UPDATE_LEASE).await {
            warn!(%err, "failed to release global update lease");
        }
    }

    /// Keep `fullUpdateKey` but cut it down so the next attempt comes soon
    async fn surrender_full_lease(&self) {
        if let Err(err) = self
            .store
            .shorten_lease(FULL_UPDATE_LEASE, self.config.full_reload_retry)
            .await
        {
            warn!(%err, "failed to shorten full update lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use crate::test_utils::FakeRegistry;
    use chrono::TimeZone;
    use lns_core::identifiers::DevEui;
    use std::time::Duration;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn harness() -> (DevAddrCacheStore, Arc<FakeRegistry>, DevAddrSynchroniser) {
        let store = DevAddrCacheStore::new(Arc::new(MemoryKvStore::new()));
        let registry = Arc::new(FakeRegistry::new());
        let sync = DevAddrSynchroniser::new(store.clone(), registry.clone());
        (store, registry, sync)
    }

    #[test]
    fn test_merge_equal_timestamp_preserves_primary_key() {
        let (_, _, sync) = harness();
        let mut existing = Bucket::new();
        let old = DevAddrCacheInfo::new(DevEui(1), DevAddr(9), timestamp())
            .with_gateway("old-gw")
            .with_primary_key("P");
        existing.insert(old.field_key(), old);

        let incoming =
            DevAddrCacheInfo::new(DevEui(1), DevAddr(9), timestamp()).with_gateway("new-gw");
        let merged = sync.merge_bucket(
            &existing,
            vec![incoming],
            MergePolicy::DiscardUnseen,
        );

        let entry = &merged["0000000000000001"];
        assert_eq!(entry.primary_key.as_deref(), Some("P"));
        assert_eq!(entry.gateway_id, "new-gw");
    }

    #[test]
    fn test_merge_newer_timestamp_clears_primary_key() {
        let (_, _, sync) = harness();
        let mut existing = Bucket::new();
        let old = DevAddrCacheInfo::new(DevEui(1), DevAddr(9), timestamp()).with_primary_key("P");
        existing.insert(old.field_key(), old);

        let newer = timestamp() + chrono::Duration::minutes(3);
        let incoming = DevAddrCacheInfo::new(DevEui(1), DevAddr(9), newer).with_gateway("gw");
        let merged = sync.merge_bucket(&existing, vec![incoming], MergePolicy::DiscardUnseen);

        let entry = &merged["0000000000000001"];
        assert_eq!(entry.primary_key, None);
        assert_eq!(entry.last_updated, newer);
        assert_eq!(entry.gateway_id, "gw");
    }

    #[test]
    fn test_merge_policy_on_unseen_entries() {
        let (_, _, sync) = harness();
        let mut existing = Bucket::new();
        let unseen = DevAddrCacheInfo::new(DevEui(2), DevAddr(9), timestamp());
        existing.insert(unseen.field_key(), unseen.clone());

        let incoming = DevAddrCacheInfo::new(DevEui(1), DevAddr(9), timestamp());

        let delta = sync.merge_bucket(
            &existing,
            vec![incoming.clone()],
            MergePolicy::RetainUnseen,
        );
        assert_eq!(delta.len(), 2, "delta keeps what it did not see");

        let full = sync.merge_bucket(&existing, vec![incoming], MergePolicy::DiscardUnseen);
        assert_eq!(full.len(), 1, "full reload owns the whole bucket");
        assert!(full.contains_key("0000000000000001"));
    }

    #[test]
    fn test_merge_drops_negative_marker_when_real_entry_arrives() {
        let (_, _, sync) = harness();
        let mut existing = Bucket::new();
        let negative = DevAddrCacheInfo::negative(DevAddr(9), timestamp());
        existing.insert(negative.field_key(), negative);

        let incoming = DevAddrCacheInfo::new(DevEui(1), DevAddr(9), timestamp());
        let merged = sync.merge_bucket(&existing, vec![incoming], MergePolicy::RetainUnseen);
        assert_eq!(merged.len(), 1);
        assert!(!merged.contains_key(""));
    }

    #[tokio::test]
    async fn test_full_reload_wins_both_leases_and_releases_global() {
        let (store, registry, sync) = harness();
        registry.add_device(
            DeviceTwin::new(DevEui(1), timestamp()).with_dev_addr(DevAddr(7)),
            "pk",
        );

        let outcome = sync.perform_needed_syncs().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Full);
        assert_eq!(registry.find_configured_calls(), 1);

        // global released, full still cooling down
        assert!(!store.lease_held(GLOBAL_UPDATE_LEASE).await.unwrap());
        assert!(store.lease_held(FULL_UPDATE_LEASE).await.unwrap());

        let bucket = store.get_bucket(DevAddr(7)).await.unwrap();
        assert_eq!(bucket.len(), 1);
    }

    #[tokio::test]
    async fn test_second_sync_runs_delta_during_cooldown() {
        let (_, registry, sync) = harness();
        assert_eq!(sync.perform_needed_syncs().await.unwrap(), SyncOutcome::Full);
        assert_eq!(sync.perform_needed_syncs().await.unwrap(), SyncOutcome::Delta);
        assert_eq!(registry.find_configured_calls(), 1);
        assert_eq!(registry.find_by_last_update_calls(), 1);
    }

    #[tokio::test]
    async fn test_contended_leases_skip() {
        let (store, _, sync) = harness();
        // both leases pre-held by another node
        assert!(store
            .take_lease(FULL_UPDATE_LEASE, Duration::from_secs(60))
            .await
            .unwrap());
        assert!(store
            .take_lease(GLOBAL_UPDATE_LEASE, Duration::from_secs(60))
            .await
            .unwrap());

        assert_eq!(
            sync.perform_needed_syncs().await.unwrap(),
            SyncOutcome::Skipped
        );
        assert_eq!(sync.stats().skipped, 1);
    }

    #[tokio::test]
    async fn test_full_failure_shortens_full_lease_and_releases_global() {
        let (store, registry, sync) = harness();
        registry.set_failing(true);

        let err = sync.perform_needed_syncs().await.unwrap_err();
        assert!(err.is_retriable());

        assert!(!store.lease_held(GLOBAL_UPDATE_LEASE).await.unwrap());
        let remaining = store.get_lease_ttl(FULL_UPDATE_LEASE).await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(60), "retry must come fast");
        assert_eq!(sync.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_warm_up_then_sync_queries_delta_twice() {
        let (_, registry, sync) = harness();
        registry.add_device(
            DeviceTwin::new(DevEui(1), Utc::now()).with_dev_addr(DevAddr(7)),
            "pk",
        );
        // pre-hold the full lease so the periodic sync takes the delta path
        sync.store
            .take_lease(FULL_UPDATE_LEASE, Duration::from_secs(60))
            .await
            .unwrap();

        sync.warm_up().await.unwrap();
        sync.perform_needed_syncs().await.unwrap();
        assert_eq!(registry.find_by_last_update_calls(), 2);
    }

    #[tokio::test]
    async fn test_full_reload_counts_stale_buckets() {
        let (store, registry, sync) = harness();
        // cache knows an address the registry no longer lists
        store
            .put_entry(
                DevAddr(0xDEAD),
                &DevAddrCacheInfo::new(DevEui(9), DevAddr(0xDEAD), timestamp()),
            )
            .await
            .unwrap();
        registry.add_device(
            DeviceTwin::new(DevEui(1), timestamp()).with_dev_addr(DevAddr(7)),
            "pk",
        );

        sync.perform_needed_syncs().await.unwrap();
        assert_eq!(sync.stats().stale_buckets_seen, 1);
        // the stale bucket is still readable until its TTL fires
        assert_eq!(store.get_bucket(DevAddr(0xDEAD)).await.unwrap().len(), 1);
    }
}
