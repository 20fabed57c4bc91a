//! LNS Dedup - Concentrator deduplication for LoRaWAN uplinks
//!
//! A device in range of several concentrators ("stations") is heard once per
//! station, and every station forwards its own copy of the frame. This crate
//! derives a canonical key per logical uplink and keeps a short-lived
//! in-process cache of the first station that delivered each key, so that
//! later copies can be suppressed or flagged.
//!
//! - [`key`] - canonical message keys for data uplinks and join requests
//! - [`cache`] - the first-seen-station cache and its classification results
//!
//! The cache is process-local by design: it exists to collapse the fan-out a
//! single server instance sees within one propagation window, not to
//! coordinate across instances.

pub mod cache;
pub mod key;

pub use cache::{
    ConcentratorDeduplication, ConcentratorDeduplicationResult, DedupConfig, DedupStats,
};
pub use key::{DataMessageKey, JoinMessageKey, MessageKey};
