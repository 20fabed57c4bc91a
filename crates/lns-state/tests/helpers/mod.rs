//! Shared harness for integration tests
//!
//! Builds the in-memory KV store and the fake registry once per test, with
//! tight timings so coalescing and lease behaviour can be exercised without
//! real waiting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use lns_state::test_utils::FakeRegistry;
use lns_state::{
    DevAddrCacheStore, DevAddrSynchroniser, DeviceGetter, GetterConfig, MemoryKvStore, SyncConfig,
};

pub struct TestHarness {
    pub kv: Arc<MemoryKvStore>,
    pub store: DevAddrCacheStore,
    pub registry: Arc<FakeRegistry>,
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();
        let kv = Arc::new(MemoryKvStore::new());
        let store = DevAddrCacheStore::new(kv.clone());
        let registry = Arc::new(FakeRegistry::new());
        Self {
            kv,
            store,
            registry,
        }
    }

    pub fn getter(&self) -> DeviceGetter {
        DeviceGetter::with_config(
            self.store.clone(),
            self.registry.clone(),
            GetterConfig::local_test(),
        )
    }

    pub fn synchroniser(&self) -> DevAddrSynchroniser {
        DevAddrSynchroniser::with_config(
            self.store.clone(),
            self.registry.clone(),
            SyncConfig {
                global_lease_ttl: Duration::from_secs(5),
                full_reload_retry: Duration::from_secs(1),
                ..SyncConfig::default()
            },
        )
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("lns_state=debug")
        .try_init();
}

/// A fixed registry timestamp for merge-rule tests
pub fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}
