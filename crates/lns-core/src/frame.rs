//! Typed views of parsed uplink frames
//!
//! The LoRaWAN packet parser itself is an external collaborator; these types
//! are the views it hands the network server once a frame has been parsed.
//! No payload decryption or MIC verification happens in this layer.

use bytes::Bytes;

use crate::identifiers::{DevAddr, DevEui, DevNonce, JoinEui, Mic, StationEui};

/// A parsed confirmed/unconfirmed data uplink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Device identity resolved for this uplink
    pub dev_eui: DevEui,
    /// Device address carried in the frame header
    pub dev_addr: DevAddr,
    /// Extended 32-bit frame counter
    pub fcnt: u32,
    /// Message integrity code as received
    pub mic: Mic,
    /// Frame port, absent for MAC-only uplinks
    pub fport: Option<u8>,
    /// MAC commands piggybacked in the frame header
    pub fopts: Bytes,
    /// Opaque (still encrypted) application payload
    pub payload: Bytes,
}

impl DataFrame {
    pub fn new(dev_eui: DevEui, dev_addr: DevAddr, fcnt: u32, mic: Mic) -> Self {
        Self {
            dev_eui,
            dev_addr,
            fcnt,
            mic,
            fport: None,
            fopts: Bytes::new(),
            payload: Bytes::new(),
        }
    }

    pub fn with_fport(mut self, fport: u8) -> Self {
        self.fport = Some(fport);
        self
    }

    pub fn with_fopts(mut self, fopts: impl Into<Bytes>) -> Self {
        self.fopts = fopts.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }
}

/// A parsed join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequestFrame {
    /// Join-server identity from the request
    pub join_eui: JoinEui,
    /// Device identity from the request
    pub dev_eui: DevEui,
    /// Per-join nonce
    pub dev_nonce: DevNonce,
    /// Message integrity code as received
    pub mic: Mic,
}

impl JoinRequestFrame {
    pub fn new(join_eui: JoinEui, dev_eui: DevEui, dev_nonce: DevNonce, mic: Mic) -> Self {
        Self {
            join_eui,
            dev_eui,
            dev_nonce,
            mic,
        }
    }
}

/// Either kind of parsed uplink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Join(JoinRequestFrame),
}

impl Frame {
    pub fn as_data(&self) -> Option<&DataFrame> {
        match self {
            Frame::Data(frame) => Some(frame),
            Frame::Join(_) => None,
        }
    }

    pub fn as_join(&self) -> Option<&JoinRequestFrame> {
        match self {
            Frame::Join(frame) => Some(frame),
            Frame::Data(_) => None,
        }
    }
}

impl From<DataFrame> for Frame {
    fn from(frame: DataFrame) -> Self {
        Frame::Data(frame)
    }
}

impl From<JoinRequestFrame> for Frame {
    fn from(frame: JoinRequestFrame) -> Self {
        Frame::Join(frame)
    }
}

/// An uplink as handed to the server by one concentrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkRequest {
    /// The concentrator that forwarded this copy of the frame
    pub station: StationEui,
    /// Logical gateway the concentrator belongs to; empty if unassigned
    pub gateway_id: String,
    /// The parsed frame
    pub frame: Frame,
}

impl UplinkRequest {
    pub fn new(station: StationEui, frame: impl Into<Frame>) -> Self {
        Self {
            station,
            gateway_id: String::new(),
            frame: frame.into(),
        }
    }

    pub fn with_gateway(mut self, gateway_id: impl Into<String>) -> Self {
        self.gateway_id = gateway_id.into();
        self
    }
}
