//! LNS Core - Foundational types for the LoRaWAN network-server support layer
//!
//! This crate provides the types shared by the concentrator deduplication
//! layer and the DevAddr cache: fixed-width LoRaWAN identifiers, typed views
//! of parsed uplink frames, and the device records exchanged with the device
//! registry.
//!
//! # Modules
//!
//! - [`identifiers`] - Fixed-width LoRaWAN identifiers (DevEui, DevAddr, ...)
//! - [`frame`] - Typed views of parsed uplink and join frames
//! - [`device`] - Device records and the persisted DevAddr cache entry
//! - [`error`] - Core error types
//!
//! # Example
//!
//! ```rust
//! use lns_core::{DevEui, StationEui};
//!
//! let dev_eui: DevEui = "0123456789ABCDEF".parse().unwrap();
//! let station: StationEui = "11:11:11:11:11:11:11:11".parse().unwrap();
//! println!("uplink from {} via {}", dev_eui, station);
//! ```

pub mod device;
pub mod error;
pub mod frame;
pub mod identifiers;

// Re-exports for convenience
pub use error::{FrameError, Result};

pub use identifiers::{DevAddr, DevEui, DevNonce, Fcnt, JoinEui, Mic, StationEui};

pub use frame::{DataFrame, Frame, JoinRequestFrame, UplinkRequest};

pub use device::{DeduplicationMode, DevAddrCacheInfo, Device, HubDeviceInfo};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
