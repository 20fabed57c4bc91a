//! Fixed-width LoRaWAN identifiers
//!
//! All identifiers are wire-endian little on the air; here they are carried
//! as plain unsigned integers and rendered in the hex forms operators see in
//! registry twins and station logs. The 64-bit EUIs accept colon- or
//! dash-separated hex on input; [`StationEui`] renders colon-separated the
//! way Basics Station identifies itself.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::FrameError;

fn parse_u64_hex(kind: &'static str, s: &str) -> Result<u64, FrameError> {
    let cleaned: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
    if cleaned.is_empty() || cleaned.len() > 16 {
        return Err(FrameError::InvalidId {
            kind,
            value: s.to_string(),
        });
    }
    u64::from_str_radix(&cleaned, 16).map_err(|_| FrameError::InvalidId {
        kind,
        value: s.to_string(),
    })
}

macro_rules! impl_string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// 64-bit permanent device identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevEui(pub u64);

impl DevEui {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DevEui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for DevEui {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_u64_hex("DevEui", s).map(Self)
    }
}

impl_string_serde!(DevEui);

/// 64-bit join-server identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinEui(pub u64);

impl JoinEui {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JoinEui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for JoinEui {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_u64_hex("JoinEui", s).map(Self)
    }
}

impl_string_serde!(JoinEui);

/// 64-bit identifier of a concentrator/gateway radio unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationEui(pub u64);

impl StationEui {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StationEui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl FromStr for StationEui {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_u64_hex("StationEui", s).map(Self)
    }
}

impl_string_serde!(StationEui);

/// 32-bit dynamic device address; not unique across devices or time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevAddr(pub u32);

impl DevAddr {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl FromStr for DevAddr {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 8 {
            return Err(FrameError::InvalidId {
                kind: "DevAddr",
                value: s.to_string(),
            });
        }
        u32::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| FrameError::InvalidId {
                kind: "DevAddr",
                value: s.to_string(),
            })
    }
}

impl_string_serde!(DevAddr);

/// 16-bit per-join nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevNonce(pub u16);

impl fmt::Display for DevNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// 32-bit message-integrity code; carried as an opaque key field here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mic(pub u32);

impl fmt::Display for Mic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// 16-bit frame counter as used in deduplication keys
///
/// The counter is 32 bits on the network side; only the lower 16 bits
/// travel in the frame and participate in key equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fcnt(pub u16);

impl Fcnt {
    /// Truncate an extended 32-bit counter to the on-air 16 bits
    pub fn from_extended(fcnt: u32) -> Self {
        Self(fcnt as u16)
    }
}

impl fmt::Display for Fcnt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
