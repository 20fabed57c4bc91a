//! LNS State - Shared DevAddr cache, synchronisation and device resolution
//!
//! Where the deduplication cache is process-local, everything in this crate
//! is cluster-shared: the DevAddr -> devices mapping lives in a distributed
//! key-value store, is reconciled against the authoritative device registry
//! under named leases, and is consulted at request time to resolve a device
//! list with credentials.
//!
//! ## Components
//!
//! - **kv**: the [`KeyValueStore`] capability trait and an in-memory
//!   implementation with the same semantics
//! - **store**: typed [`DevAddrCacheStore`] over the KV store (buckets,
//!   leases, key layout)
//! - **registry**: the [`DeviceRegistry`] capability trait and its record
//!   types
//! - **sync**: [`DevAddrSynchroniser`] - lock-guarded full and delta
//!   reloads from the registry
//! - **getter**: [`DeviceGetter`] - request-time DevAddr resolution with
//!   cluster-wide single-flight on cache misses
//! - **test_utils**: in-memory registry fake with call counters
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lns_state::{DevAddrCacheStore, DevAddrSynchroniser, DeviceGetter, MemoryKvStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let kv = Arc::new(MemoryKvStore::new());
//!     let store = DevAddrCacheStore::new(kv);
//!     let registry = Arc::new(my_registry_client());
//!
//!     let sync = DevAddrSynchroniser::new(store.clone(), registry.clone());
//!     sync.warm_up().await?;
//!     sync.perform_needed_syncs().await?;
//!
//!     let getter = DeviceGetter::new(store, registry);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod getter;
pub mod kv;
pub mod registry;
pub mod store;
pub mod sync;
pub mod test_utils;

// Re-exports for convenience
pub use config::{GetterConfig, SyncConfig};
pub use error::{Result, StateError};
pub use getter::{DeviceGetter, GetterStats};
pub use kv::{KeyValueStore, MemoryKvStore};
pub use registry::{DeviceCredentials, DeviceRegistry, DeviceTwin};
pub use store::{
    Bucket, DevAddrCacheStore, DEVADDR_TABLE_PREFIX, FULL_UPDATE_LEASE, GLOBAL_UPDATE_LEASE,
};
pub use sync::{DevAddrSynchroniser, SyncOutcome, SyncStats};
