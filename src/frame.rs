use crate::error::BusError;
use core::fmt;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

pub const FRAME_LEN: usize = 8;

pub type Payload = [u8; FRAME_LEN];

// Classic CAN data field, shared with the dashboard decoder
const_assert_eq!(FRAME_LEN, 8);

/// Identifiers of the message family produced by the simulator.
///
/// There is no 0x300 group in this protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageId {
    EngineData = 0x100,
    VehicleSpeed = 0x200,
    TransmissionData = 0x400,
    BatteryStatus = 0x500,
    WarningLights = 0x600,
}

impl MessageId {
    /// Emission order within one simulation tick
    pub const ALL: [MessageId; 5] = [
        MessageId::EngineData,
        MessageId::VehicleSpeed,
        MessageId::TransmissionData,
        MessageId::BatteryStatus,
        MessageId::WarningLights,
    ];

    pub fn from_raw(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.raw() == id)
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageId::EngineData => "Engine_Data",
            MessageId::VehicleSpeed => "Vehicle_Speed",
            MessageId::TransmissionData => "Transmission_Data",
            MessageId::BatteryStatus => "Battery_Status",
            MessageId::WarningLights => "Warning_Lights",
        }
    }
}

/// An identifier plus exactly eight payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanFrame {
    id: u32,
    payload: Payload,
}

impl CanFrame {
    pub const fn new(id: u32, payload: Payload) -> Self {
        Self { id, payload }
    }

    /// Build a frame from an arbitrary byte slice.
    ///
    /// Anything but eight bytes is rejected; payloads are never padded or truncated here.
    pub fn from_slice(id: u32, data: &[u8]) -> Result<Self, BusError> {
        let payload: Payload = data
            .try_into()
            .map_err(|_| BusError::InvalidFrame { len: data.len() })?;
        Ok(Self { id, payload })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn message(&self) -> Option<MessageId> {
        MessageId::from_raw(self.id)
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X} [", self.id)?;
        for (i, byte) in self.payload.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        f.write_str("]")
    }
}
