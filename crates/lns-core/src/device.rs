//! Device records and the persisted DevAddr cache entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{DevAddr, DevEui};

/// Per-device policy for uplinks received via more than one concentrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeduplicationMode {
    /// Cross-station duplicates are dropped
    #[default]
    Drop,
    /// Cross-station duplicates are forwarded, flagged as duplicates
    Mark,
    /// No strategy configured; duplicates are forwarded flagged
    None,
}

/// The view of a device the deduplication layer needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub dev_eui: DevEui,
    pub deduplication: DeduplicationMode,
}

impl Device {
    pub fn new(dev_eui: DevEui) -> Self {
        Self {
            dev_eui,
            deduplication: DeduplicationMode::default(),
        }
    }

    pub fn with_deduplication(mut self, mode: DeduplicationMode) -> Self {
        self.deduplication = mode;
        self
    }
}

/// Serialize `Option<T: Display>` as its string form, `None` as ""
mod empty_as_none {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        // Readers must accept both "" and null for unknown fields
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

/// Record stored per device in a DevAddr bucket
///
/// This is the exact JSON shape persisted in the shared KV store. A record
/// with no `DevEUI` is a negative entry: the address was looked up and no
/// configured device owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevAddrCacheInfo {
    #[serde(rename = "DevEUI", with = "empty_as_none", default)]
    pub dev_eui: Option<DevEui>,
    #[serde(rename = "DevAddr")]
    pub dev_addr: DevAddr,
    #[serde(rename = "GatewayId", default)]
    pub gateway_id: String,
    #[serde(rename = "NwkSKey", default)]
    pub nwk_s_key: String,
    #[serde(rename = "PrimaryKey", with = "empty_as_none", default)]
    pub primary_key: Option<String>,
    #[serde(rename = "LastUpdatedTwins")]
    pub last_updated: DateTime<Utc>,
}

impl DevAddrCacheInfo {
    pub fn new(dev_eui: DevEui, dev_addr: DevAddr, last_updated: DateTime<Utc>) -> Self {
        Self {
            dev_eui: Some(dev_eui),
            dev_addr,
            gateway_id: String::new(),
            nwk_s_key: String::new(),
            primary_key: None,
            last_updated,
        }
    }

    /// Negative entry: lookups for this address found no configured device
    pub fn negative(dev_addr: DevAddr, last_updated: DateTime<Utc>) -> Self {
        Self {
            dev_eui: None,
            dev_addr,
            gateway_id: String::new(),
            nwk_s_key: String::new(),
            primary_key: None,
            last_updated,
        }
    }

    pub fn with_gateway(mut self, gateway_id: impl Into<String>) -> Self {
        self.gateway_id = gateway_id.into();
        self
    }

    pub fn with_nwk_s_key(mut self, nwk_s_key: impl Into<String>) -> Self {
        self.nwk_s_key = nwk_s_key.into();
        self
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    pub fn is_negative(&self) -> bool {
        self.dev_eui.is_none()
    }

    pub fn has_primary_key(&self) -> bool {
        self.primary_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Whether this device may serve uplinks arriving through `gateway_id`.
    /// An entry with no gateway assignment serves any gateway.
    pub fn matches_gateway(&self, gateway_id: &str) -> bool {
        self.gateway_id.is_empty() || self.gateway_id == gateway_id
    }

    /// The hash field this entry is stored under
    pub fn field_key(&self) -> String {
        self.dev_eui.map(|eui| eui.to_string()).unwrap_or_default()
    }
}

/// A resolved device as returned to the frame-processing pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubDeviceInfo {
    pub dev_eui: DevEui,
    pub dev_addr: DevAddr,
    pub gateway_id: String,
    pub nwk_s_key: String,
    /// Credential for the device connection; empty when still unknown
    pub primary_key: String,
}

impl HubDeviceInfo {
    pub fn from_cache_info(info: &DevAddrCacheInfo) -> Option<Self> {
        Some(Self {
            dev_eui: info.dev_eui?,
            dev_addr: info.dev_addr,
            gateway_id: info.gateway_id.clone(),
            nwk_s_key: info.nwk_s_key.clone(),
            primary_key: info.primary_key.clone().unwrap_or_default(),
        })
    }
}
