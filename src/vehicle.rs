use serde::{Deserialize, Serialize};

pub const SPEED_MIN_KMH: u16 = 0;
pub const SPEED_MAX_KMH: u16 = 120;
pub const RPM_MIN: u16 = 700;
pub const RPM_MAX: u16 = 6000;
pub const IDLE_RPM: u16 = 800;
pub const FUEL_MAX_PERCENT: u8 = 100;
pub const ENGINE_TEMP_MIN_C: i16 = 70;
pub const ENGINE_TEMP_MAX_C: i16 = 110;

// Below this the engine is considered stalled
const ENGINE_RUNNING_RPM: u16 = 500;

/// Signals the simulator evolves and the encoder serializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleState {
    pub speed_kmh: u16,
    pub rpm: u16,
    pub fuel_percent: u8,
    pub engine_temp_c: i16,
    pub left_turn_signal: bool,
    pub right_turn_signal: bool,
    pub headlights: bool,
}

impl VehicleState {
    pub fn new() -> Self {
        Self {
            speed_kmh: 0,
            rpm: IDLE_RPM,
            fuel_percent: 85,
            engine_temp_c: 90,
            left_turn_signal: false,
            right_turn_signal: false,
            headlights: false,
        }
    }

    /// Derived from RPM, never stored.
    pub fn engine_running(&self) -> bool {
        self.rpm > ENGINE_RUNNING_RPM
    }

    pub fn is_moving(&self) -> bool {
        self.speed_kmh > 0
    }

    pub fn in_range(&self) -> bool {
        (SPEED_MIN_KMH..=SPEED_MAX_KMH).contains(&self.speed_kmh)
            && (RPM_MIN..=RPM_MAX).contains(&self.rpm)
            && self.fuel_percent <= FUEL_MAX_PERCENT
            && (ENGINE_TEMP_MIN_C..=ENGINE_TEMP_MAX_C).contains(&self.engine_temp_c)
    }
}

impl Default for VehicleState {
    fn default() -> Self {
        Self::new()
    }
}
