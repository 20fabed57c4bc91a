//! First-seen-station cache and duplicate classification
//!
//! The first station to deliver a given message key within the TTL window is
//! recorded as authoritative; every later copy is classified against it.
//! Data uplinks distinguish a resubmission (same station retrying) from a
//! cross-station duplicate, and cross-station handling follows the device's
//! [`DeduplicationMode`]. Join requests are stricter: any second observation
//! is a duplicate, whichever station sent it.
//!
//! The read-or-insert is linearised per cache under one mutex, so two
//! concurrent checks for the same key agree on which one was first.

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use lns_core::device::{DeduplicationMode, Device};
use lns_core::frame::UplinkRequest;
use lns_core::identifiers::StationEui;
use lns_core::Result;

use crate::key::MessageKey;

/// Outcome of checking one received frame copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcentratorDeduplicationResult {
    /// First observation of this message key
    NotDuplicate,
    /// Same key re-delivered by the station that was first
    DuplicateDueToResubmission,
    /// Same key from another station, and the device's mode says drop
    Duplicate,
    /// Same key from another station, forwarded flagged (mode Mark or None)
    SoftDuplicateDueToDeduplicationStrategy,
}

/// Configuration for the deduplication cache
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Maximum number of tracked message keys
    pub capacity: usize,
    /// Sliding window during which the first-seen station stays authoritative
    pub ttl: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            ttl: Duration::from_secs(60),
        }
    }
}

/// Entry stored per message key
#[derive(Debug, Clone)]
struct SeenEntry {
    /// The authoritative first-seen station
    station: StationEui,
    /// When this key was first observed
    first_seen: Instant,
    /// Most recent observation; the TTL window slides from here
    last_seen: Instant,
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct DedupStats {
    /// Total check calls
    pub total_checks: u64,
    /// First observations
    pub not_duplicate: u64,
    /// Same-station re-deliveries of data uplinks
    pub resubmissions: u64,
    /// Hard duplicates (cross-station drop, and repeated joins)
    pub duplicates: u64,
    /// Cross-station duplicates forwarded flagged
    pub soft_duplicates: u64,
    /// Entries whose window had lapsed and were re-armed in place
    pub expired_reinserts: u64,
}

impl DedupStats {
    /// Fraction of checks that were some kind of duplicate (0.0 to 1.0)
    pub fn duplicate_rate(&self) -> f64 {
        if self.total_checks == 0 {
            0.0
        } else {
            (self.resubmissions + self.duplicates + self.soft_duplicates) as f64
                / self.total_checks as f64
        }
    }
}

enum Observation {
    /// Key was unseen (or lapsed); this station is now authoritative
    First,
    /// Key already tracked; carries the authoritative station
    Seen(StationEui),
}

/// Per-process cache of the first station that delivered each message key
///
/// Thread-safe and cheap to clone (clones share the underlying cache).
/// Scoped to one service instance; construct one per tenant.
#[derive(Debug)]
pub struct ConcentratorDeduplication {
    cache: Arc<Mutex<LruCache<MessageKey, SeenEntry>>>,
    ttl: Duration,
    stats: Arc<RwLock<DedupStats>>,
}

impl ConcentratorDeduplication {
    pub fn new() -> Self {
        Self::with_config(DedupConfig::default())
    }

    pub fn with_config(config: DedupConfig) -> Self {
        let cap = NonZeroUsize::new(config.capacity.max(1)).unwrap();
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
            ttl: config.ttl,
            stats: Arc::new(RwLock::new(DedupStats::default())),
        }
    }

    /// Classify one copy of a data uplink
    ///
    /// Fails only if `request` does not carry a data frame.
    pub fn check_duplicate_data(
        &self,
        request: &UplinkRequest,
        device: &Device,
    ) -> Result<ConcentratorDeduplicationResult> {
        let key = MessageKey::for_data(&request.frame)?;
        let result = match self.observe(key, request.station) {
            Observation::First => ConcentratorDeduplicationResult::NotDuplicate,
            Observation::Seen(first) if first == request.station => {
                ConcentratorDeduplicationResult::DuplicateDueToResubmission
            }
            Observation::Seen(_) => match device.deduplication {
                DeduplicationMode::Drop => ConcentratorDeduplicationResult::Duplicate,
                DeduplicationMode::Mark | DeduplicationMode::None => {
                    ConcentratorDeduplicationResult::SoftDuplicateDueToDeduplicationStrategy
                }
            },
        };
        self.record(key, request.station, result);
        Ok(result)
    }

    /// Classify one copy of a join request
    ///
    /// Joins never yield `DuplicateDueToResubmission`: a device must not
    /// reuse a DevNonce, so a repeat is a duplicate whoever delivered it.
    pub fn check_duplicate_join(
        &self,
        request: &UplinkRequest,
    ) -> Result<ConcentratorDeduplicationResult> {
        let key = MessageKey::for_join(&request.frame)?;
        let result = match self.observe(key, request.station) {
            Observation::First => ConcentratorDeduplicationResult::NotDuplicate,
            Observation::Seen(_) => ConcentratorDeduplicationResult::Duplicate,
        };
        self.record(key, request.station, result);
        Ok(result)
    }

    /// Atomic read-or-insert; the stored station is never overwritten while
    /// the window is live.
    fn observe(&self, key: MessageKey, station: StationEui) -> Observation {
        let now = Instant::now();
        let mut cache = self.cache.lock();
        match cache.get_mut(&key) {
            Some(entry) if now.duration_since(entry.last_seen) > self.ttl => {
                // Window lapsed; this delivery counts as a fresh first sight
                trace!(key = %key, "entry expired, re-arming");
                entry.station = station;
                entry.first_seen = now;
                entry.last_seen = now;
                self.stats.write().expired_reinserts += 1;
                Observation::First
            }
            Some(entry) => {
                entry.last_seen = now;
                Observation::Seen(entry.station)
            }
            None => {
                cache.put(
                    key,
                    SeenEntry {
                        station,
                        first_seen: now,
                        last_seen: now,
                    },
                );
                Observation::First
            }
        }
    }

    fn record(&self, key: MessageKey, station: StationEui, result: ConcentratorDeduplicationResult) {
        let mut stats = self.stats.write();
        stats.total_checks += 1;
        match result {
            ConcentratorDeduplicationResult::NotDuplicate => {
                trace!(key = %key, station = %station, "first observation");
                stats.not_duplicate += 1;
            }
            ConcentratorDeduplicationResult::DuplicateDueToResubmission => {
                debug!(key = %key, station = %station, "resubmission");
                stats.resubmissions += 1;
            }
            ConcentratorDeduplicationResult::Duplicate => {
                debug!(key = %key, station = %station, "duplicate dropped");
                stats.duplicates += 1;
            }
            ConcentratorDeduplicationResult::SoftDuplicateDueToDeduplicationStrategy => {
                debug!(key = %key, station = %station, "soft duplicate");
                stats.soft_duplicates += 1;
            }
        }
    }

    /// The station currently authoritative for a key, if tracked
    pub fn first_station(&self, key: &MessageKey) -> Option<StationEui> {
        self.cache.lock().peek(key).map(|entry| entry.station)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DedupStats {
        self.stats.read().clone()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for ConcentratorDeduplication {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ConcentratorDeduplication {
    fn clone(&self) -> Self {
        // Clones share the same underlying cache
        Self {
            cache: Arc::clone(&self.cache),
            ttl: self.ttl,
            stats: Arc::clone(&self.stats),
        }
    }
}
