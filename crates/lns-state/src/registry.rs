//! Device registry capability trait
//!
//! The authoritative device registry ("IoT Hub") is an external collaborator;
//! this trait is the seam the synchroniser and the getter consume it through.
//! Implementations own pagination, authentication and transport; callers see
//! collected results and [`StateError::Registry`] on failure.
//!
//! [`StateError::Registry`]: crate::error::StateError::Registry

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lns_core::device::DevAddrCacheInfo;
use lns_core::identifiers::{DevAddr, DevEui};

use crate::error::Result;

/// Registry-side representation of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTwin {
    pub dev_eui: DevEui,
    /// Current address; absent for devices that have not joined
    pub dev_addr: Option<DevAddr>,
    /// Gateway affinity; empty if unassigned
    pub gateway_id: String,
    pub nwk_s_key: String,
    /// Registry-side last-modification timestamp
    pub last_updated: DateTime<Utc>,
}

impl DeviceTwin {
    pub fn new(dev_eui: DevEui, last_updated: DateTime<Utc>) -> Self {
        Self {
            dev_eui,
            dev_addr: None,
            gateway_id: String::new(),
            nwk_s_key: String::new(),
            last_updated,
        }
    }

    pub fn with_dev_addr(mut self, dev_addr: DevAddr) -> Self {
        self.dev_addr = Some(dev_addr);
        self
    }

    pub fn with_gateway(mut self, gateway_id: impl Into<String>) -> Self {
        self.gateway_id = gateway_id.into();
        self
    }

    pub fn with_nwk_s_key(mut self, nwk_s_key: impl Into<String>) -> Self {
        self.nwk_s_key = nwk_s_key.into();
        self
    }

    /// The cache record this twin maps to; `None` without an address
    pub fn to_cache_info(&self) -> Option<DevAddrCacheInfo> {
        let dev_addr = self.dev_addr?;
        Some(
            DevAddrCacheInfo::new(self.dev_eui, dev_addr, self.last_updated)
                .with_gateway(self.gateway_id.clone())
                .with_nwk_s_key(self.nwk_s_key.clone()),
        )
    }
}

/// Per-device credentials held by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCredentials {
    pub primary_key: String,
    /// Hub instance the device connection should go to
    pub assigned_hub: String,
}

/// Capability trait over the device registry
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Fetch a device's credentials
    async fn get_device(&self, dev_eui: DevEui) -> Result<Option<DeviceCredentials>>;

    /// Fetch one device twin
    async fn get_twin(&self, dev_eui: DevEui) -> Result<Option<DeviceTwin>>;

    /// All twins currently holding the given address
    async fn find_by_addr(&self, dev_addr: DevAddr) -> Result<Vec<DeviceTwin>>;

    /// All configured LoRa device twins; drives full reloads
    async fn find_configured_lora_devices(&self) -> Result<Vec<DeviceTwin>>;

    /// Twins modified since `since`; drives delta reloads
    async fn find_by_last_update_date(&self, since: DateTime<Utc>) -> Result<Vec<DeviceTwin>>;
}
