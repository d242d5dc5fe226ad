//! Pack and unpack the five-frame vehicle message family.
//!
//! | ID    | Bytes | Signal                                             |
//! |-------|-------|----------------------------------------------------|
//! | 0x100 | 0-1   | RPM, scale 0.25, little-endian                     |
//! |       | 2     | engine load, percent                               |
//! |       | 3     | coolant temperature, offset -40                    |
//! |       | 4     | throttle, percent                                  |
//! |       | 5-6   | oil pressure, little-endian                        |
//! |       | 7     | fuel level, scale 0.392157                         |
//! | 0x200 | 0-1   | vehicle speed, scale 0.1, little-endian            |
//! |       | 2-7   | wheel speeds FL, FR, RL, same encoding             |
//! | 0x400 | 0     | gear, low nibble                                   |
//! |       | 2     | bit1 = park                                        |
//! | 0x500 | 0-1   | battery voltage, scale 0.01, little-endian         |
//! | 0x600 | 0     | warnings (reserved)                                |
//! |       | 1     | bit0 left turn, bit1 right turn, bit2 headlights   |

use crate::error::BusError;
use crate::frame::{CanFrame, MessageId, Payload, FRAME_LEN};
use crate::vehicle::VehicleState;
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Frames produced by one simulation tick.
pub type FrameBatch = Vec<CanFrame, 5>;

const RPM_RAW_PER_UNIT: u16 = 4;
const SPEED_RAW_PER_UNIT: u16 = 10;
const VOLTAGE_RAW_PER_UNIT: f32 = 100.0;
const COOLANT_OFFSET_C: i16 = 40;
const FUEL_SCALE: f64 = 0.392_157;

const ENGINE_LOAD_PERCENT: u8 = 50;
const OIL_PRESSURE_RAW: u16 = 150;
const THROTTLE_MAX_PERCENT: u16 = 100;

const BATTERY_RUNNING_RAW: u16 = 1400;
const BATTERY_OFF_RAW: u16 = 1200;

const PARK_FLAG: u8 = 0x02;
const LEFT_TURN_BIT: u8 = 0x01;
const RIGHT_TURN_BIT: u8 = 0x02;
const HEADLIGHTS_BIT: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gear {
    Park,
    Reverse,
    Neutral,
    Drive,
    Other(u8),
}

impl Gear {
    pub fn from_nibble(raw: u8) -> Self {
        match raw & 0x0F {
            0 => Gear::Park,
            1 => Gear::Reverse,
            2 => Gear::Neutral,
            3 => Gear::Drive,
            n => Gear::Other(n),
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            Gear::Park => 0,
            Gear::Reverse => 1,
            Gear::Neutral => 2,
            Gear::Drive => 3,
            Gear::Other(n) => n & 0x0F,
        }
    }
}

/// Physical values recovered from a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecodedSignals {
    Engine {
        rpm: f32,
        load_percent: u8,
        coolant_temp_c: i16,
        throttle_percent: u8,
        oil_pressure: u16,
        fuel_percent: f32,
    },
    Speed {
        speed_kmh: f32,
        wheel_speeds_kmh: [f32; 3],
    },
    Transmission {
        gear: Gear,
        park: bool,
    },
    Battery {
        voltage: f32,
    },
    Warnings {
        warnings: u8,
        left_turn_signal: bool,
        right_turn_signal: bool,
        headlights: bool,
    },
}

fn put_u16(payload: &mut Payload, at: usize, value: u16) {
    payload[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(payload: &Payload, at: usize) -> u16 {
    u16::from_le_bytes([payload[at], payload[at + 1]])
}

pub fn encode_engine_data(state: &VehicleState) -> CanFrame {
    let mut payload = [0u8; FRAME_LEN];
    put_u16(&mut payload, 0, state.rpm.saturating_mul(RPM_RAW_PER_UNIT));
    payload[2] = ENGINE_LOAD_PERCENT;
    payload[3] = state.engine_temp_c.saturating_add(COOLANT_OFFSET_C).clamp(0, 255) as u8;
    payload[4] = state.speed_kmh.saturating_mul(2).min(THROTTLE_MAX_PERCENT) as u8;
    put_u16(&mut payload, 5, OIL_PRESSURE_RAW);
    // Truncates toward zero: 85% -> 216, 100% -> 254
    payload[7] = (f64::from(state.fuel_percent) / FUEL_SCALE) as u8;
    CanFrame::new(MessageId::EngineData.raw(), payload)
}

pub fn encode_vehicle_speed(state: &VehicleState) -> CanFrame {
    let raw = state.speed_kmh.saturating_mul(SPEED_RAW_PER_UNIT);
    let mut payload = [0u8; FRAME_LEN];
    // Vehicle speed followed by FL, FR, RL wheels
    for at in (0..FRAME_LEN).step_by(2) {
        put_u16(&mut payload, at, raw);
    }
    CanFrame::new(MessageId::VehicleSpeed.raw(), payload)
}

pub fn encode_transmission(state: &VehicleState) -> CanFrame {
    let gear = if state.is_moving() { Gear::Drive } else { Gear::Park };
    let mut payload = [0u8; FRAME_LEN];
    payload[0] = gear.nibble();
    payload[2] = if state.is_moving() { 0x00 } else { PARK_FLAG };
    CanFrame::new(MessageId::TransmissionData.raw(), payload)
}

pub fn encode_battery(state: &VehicleState) -> CanFrame {
    let raw = if state.engine_running() {
        BATTERY_RUNNING_RAW
    } else {
        BATTERY_OFF_RAW
    };
    let mut payload = [0u8; FRAME_LEN];
    put_u16(&mut payload, 0, raw);
    CanFrame::new(MessageId::BatteryStatus.raw(), payload)
}

pub fn encode_warning_lights(state: &VehicleState) -> CanFrame {
    let mut bits = 0u8;
    if state.left_turn_signal {
        bits |= LEFT_TURN_BIT;
    }
    if state.right_turn_signal {
        bits |= RIGHT_TURN_BIT;
    }
    if state.headlights {
        bits |= HEADLIGHTS_BIT;
    }
    let mut payload = [0u8; FRAME_LEN];
    payload[1] = bits;
    CanFrame::new(MessageId::WarningLights.raw(), payload)
}

pub fn encode(message: MessageId, state: &VehicleState) -> CanFrame {
    match message {
        MessageId::EngineData => encode_engine_data(state),
        MessageId::VehicleSpeed => encode_vehicle_speed(state),
        MessageId::TransmissionData => encode_transmission(state),
        MessageId::BatteryStatus => encode_battery(state),
        MessageId::WarningLights => encode_warning_lights(state),
    }
}

/// Serialize the whole state in emission order.
pub fn encode_all(state: &VehicleState) -> FrameBatch {
    MessageId::ALL
        .iter()
        .map(|&message| encode(message, state))
        .collect()
}

pub fn decode(frame: &CanFrame) -> Result<DecodedSignals, BusError> {
    let message = frame
        .message()
        .ok_or(BusError::UnknownMessage(frame.id()))?;
    let p = frame.payload();

    let signals = match message {
        MessageId::EngineData => DecodedSignals::Engine {
            rpm: f32::from(get_u16(p, 0)) / f32::from(RPM_RAW_PER_UNIT),
            load_percent: p[2],
            coolant_temp_c: i16::from(p[3]) - COOLANT_OFFSET_C,
            throttle_percent: p[4],
            oil_pressure: get_u16(p, 5),
            fuel_percent: (f64::from(p[7]) * FUEL_SCALE) as f32,
        },
        MessageId::VehicleSpeed => {
            let speed = |at| f32::from(get_u16(p, at)) / f32::from(SPEED_RAW_PER_UNIT);
            DecodedSignals::Speed {
                speed_kmh: speed(0),
                wheel_speeds_kmh: [speed(2), speed(4), speed(6)],
            }
        }
        MessageId::TransmissionData => DecodedSignals::Transmission {
            gear: Gear::from_nibble(p[0]),
            park: p[2] & PARK_FLAG != 0,
        },
        MessageId::BatteryStatus => DecodedSignals::Battery {
            voltage: f32::from(get_u16(p, 0)) / VOLTAGE_RAW_PER_UNIT,
        },
        MessageId::WarningLights => DecodedSignals::Warnings {
            warnings: p[0],
            left_turn_signal: p[1] & LEFT_TURN_BIT != 0,
            right_turn_signal: p[1] & RIGHT_TURN_BIT != 0,
            headlights: p[1] & HEADLIGHTS_BIT != 0,
        },
    };
    Ok(signals)
}
