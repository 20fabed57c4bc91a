//! Canonical deduplication keys
//!
//! Two copies of the same logical uplink must derive the same key no matter
//! which station delivered them, and nothing outside the key fields may
//! influence equality:
//!
//! - data uplinks key on `(DevEui, Mic, Fcnt)` — payload, port and MAC
//!   options are excluded;
//! - join requests key on `(JoinEui, DevEui, DevNonce)` — the MIC is
//!   excluded.

use std::fmt;

use lns_core::frame::{DataFrame, Frame, JoinRequestFrame};
use lns_core::identifiers::{DevEui, DevNonce, Fcnt, JoinEui, Mic};
use lns_core::{FrameError, Result};

/// Key identifying one logical data uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataMessageKey {
    pub dev_eui: DevEui,
    pub mic: Mic,
    pub fcnt: Fcnt,
}

impl DataMessageKey {
    pub fn from_frame(frame: &DataFrame) -> Self {
        Self {
            dev_eui: frame.dev_eui,
            mic: frame.mic,
            fcnt: Fcnt::from_extended(frame.fcnt),
        }
    }
}

impl fmt::Display for DataMessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{}:{}:{}", self.dev_eui, self.mic, self.fcnt)
    }
}

/// Key identifying one logical join request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinMessageKey {
    pub join_eui: JoinEui,
    pub dev_eui: DevEui,
    pub dev_nonce: DevNonce,
}

impl JoinMessageKey {
    pub fn from_frame(frame: &JoinRequestFrame) -> Self {
        Self {
            join_eui: frame.join_eui,
            dev_eui: frame.dev_eui,
            dev_nonce: frame.dev_nonce,
        }
    }
}

impl fmt::Display for JoinMessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "join:{}:{}:{}", self.join_eui, self.dev_eui, self.dev_nonce)
    }
}

/// Either kind of deduplication key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Data(DataMessageKey),
    Join(JoinMessageKey),
}

impl MessageKey {
    /// Derive the data key; rejects join frames
    pub fn for_data(frame: &Frame) -> Result<Self> {
        frame
            .as_data()
            .map(|data| MessageKey::Data(DataMessageKey::from_frame(data)))
            .ok_or(FrameError::WrongFrameType { expected: "data" })
    }

    /// Derive the join key; rejects data frames
    pub fn for_join(frame: &Frame) -> Result<Self> {
        frame
            .as_join()
            .map(|join| MessageKey::Join(JoinMessageKey::from_frame(join)))
            .ok_or(FrameError::WrongFrameType { expected: "join" })
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::Data(key) => key.fmt(f),
            MessageKey::Join(key) => key.fmt(f),
        }
    }
}

impl From<DataMessageKey> for MessageKey {
    fn from(key: DataMessageKey) -> Self {
        MessageKey::Data(key)
    }
}

impl From<JoinMessageKey> for MessageKey {
    fn from(key: JoinMessageKey) -> Self {
        MessageKey::Join(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lns_core::identifiers::DevAddr;

    fn data_frame() -> DataFrame {
        DataFrame::new(DevEui(0x11), DevAddr(0x22), 42, Mic(0x33))
    }

    #[test]
    fn test_data_key_equality_is_the_triple() {
        let a = DataMessageKey::from_frame(&data_frame());
        let b = DataMessageKey::from_frame(&data_frame());
        assert_eq!(a, b);

        let other_mic = DataFrame::new(DevEui(0x11), DevAddr(0x22), 42, Mic(0x34));
        assert_ne!(a, DataMessageKey::from_frame(&other_mic));

        let other_fcnt = DataFrame::new(DevEui(0x11), DevAddr(0x22), 43, Mic(0x33));
        assert_ne!(a, DataMessageKey::from_frame(&other_fcnt));

        let other_eui = DataFrame::new(DevEui(0x12), DevAddr(0x22), 42, Mic(0x33));
        assert_ne!(a, DataMessageKey::from_frame(&other_eui));
    }

    #[test]
    fn test_data_key_ignores_payload_fields() {
        let bare = DataMessageKey::from_frame(&data_frame());
        let dressed = data_frame()
            .with_fport(12)
            .with_fopts(vec![0x01, 0x02])
            .with_payload(vec![0xCA, 0xFE]);
        assert_eq!(bare, DataMessageKey::from_frame(&dressed));
    }

    #[test]
    fn test_data_key_ignores_dev_addr() {
        let a = DataMessageKey::from_frame(&data_frame());
        let moved = DataFrame::new(DevEui(0x11), DevAddr(0x99), 42, Mic(0x33));
        assert_eq!(a, DataMessageKey::from_frame(&moved));
    }

    #[test]
    fn test_data_key_uses_low_16_counter_bits() {
        let a = DataFrame::new(DevEui(1), DevAddr(1), 0x0001_0005, Mic(1));
        let b = DataFrame::new(DevEui(1), DevAddr(1), 0x0002_0005, Mic(1));
        assert_eq!(
            DataMessageKey::from_frame(&a),
            DataMessageKey::from_frame(&b)
        );
    }

    #[test]
    fn test_join_key_ignores_mic() {
        let a = JoinRequestFrame::new(JoinEui(1), DevEui(2), DevNonce(3), Mic(4));
        let b = JoinRequestFrame::new(JoinEui(1), DevEui(2), DevNonce(3), Mic(5));
        assert_eq!(
            JoinMessageKey::from_frame(&a),
            JoinMessageKey::from_frame(&b)
        );

        let other_nonce = JoinRequestFrame::new(JoinEui(1), DevEui(2), DevNonce(4), Mic(4));
        assert_ne!(
            JoinMessageKey::from_frame(&a),
            JoinMessageKey::from_frame(&other_nonce)
        );
    }

    #[test]
    fn test_wrong_frame_type_is_rejected() {
        let data: Frame = data_frame().into();
        let join: Frame = JoinRequestFrame::new(JoinEui(1), DevEui(2), DevNonce(3), Mic(4)).into();

        assert!(MessageKey::for_data(&data).is_ok());
        assert!(MessageKey::for_join(&join).is_ok());
        assert_eq!(
            MessageKey::for_data(&join),
            Err(FrameError::WrongFrameType { expected: "data" })
        );
        assert_eq!(
            MessageKey::for_join(&data),
            Err(FrameError::WrongFrameType { expected: "join" })
        );
    }

    #[test]
    fn test_data_and_join_keys_never_collide() {
        let data = MessageKey::Data(DataMessageKey::from_frame(&data_frame()));
        let join = MessageKey::Join(JoinMessageKey::from_frame(&JoinRequestFrame::new(
            JoinEui(0),
            DevEui(0x11),
            DevNonce(42),
            Mic(0x33),
        )));
        assert_ne!(data, join);
    }

    #[test]
    fn test_key_display() {
        let key = MessageKey::Data(DataMessageKey {
            dev_eui: DevEui(0),
            mic: Mic(0),
            fcnt: Fcnt(0),
        });
        assert_eq!(key.to_string(), "data:0000000000000000:00000000:0");
    }
}
