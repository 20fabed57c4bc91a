//! Configuration for the synchroniser and the device getter

use std::time::Duration;

/// Registry synchronisation configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// TTL of `fullUpdateKey` after a successful full reload; no node starts
    /// another full reload while it lives
    pub full_reload_cooldown: Duration,
    /// TTL `fullUpdateKey` is shortened to after a failed full reload
    pub full_reload_retry: Duration,
    /// TTL of `globalUpdateKey` while a sync is running
    pub global_lease_ttl: Duration,
    /// Overlap subtracted from the delta baseline to absorb clock skew
    pub delta_overlap: Duration,
    /// TTL applied to DevAddr buckets on write; stale buckets age out here
    pub bucket_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            full_reload_cooldown: Duration::from_secs(24 * 60 * 60),
            full_reload_retry: Duration::from_secs(60),
            global_lease_ttl: Duration::from_secs(5 * 60),
            delta_overlap: Duration::from_secs(5 * 60),
            bucket_ttl: Duration::from_secs(25 * 60 * 60),
        }
    }
}

/// Device-getter configuration
#[derive(Debug, Clone)]
pub struct GetterConfig {
    /// TTL of the per-DevAddr lease coalescing cache misses
    pub devaddr_lease_ttl: Duration,
    /// How often a waiting caller re-reads the bucket
    pub poll_interval: Duration,
    /// Upper bound on waiting for another resolver to populate the bucket
    pub resolve_timeout: Duration,
}

impl Default for GetterConfig {
    fn default() -> Self {
        Self {
            devaddr_lease_ttl: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            resolve_timeout: Duration::from_secs(10),
        }
    }
}

impl GetterConfig {
    /// Tight timings for tests
    pub fn local_test() -> Self {
        Self {
            devaddr_lease_ttl: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            resolve_timeout: Duration::from_secs(2),
        }
    }
}
