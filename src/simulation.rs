use crate::vehicle::{
    VehicleState, ENGINE_TEMP_MAX_C, ENGINE_TEMP_MIN_C, IDLE_RPM, RPM_MAX, RPM_MIN,
    SPEED_MAX_KMH, SPEED_MIN_KMH,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SPEED_STEP_KMH: i32 = 2;
const RPM_PER_KMH: i32 = 25;
const RPM_NOISE: i32 = 100;
const TEMP_STEP_C: i32 = 1;

// Roughly 0.1% of moving ticks burn a percent of fuel
const FUEL_BURN_CHANCE: (u32, u32) = (1, 1000);
const TURN_SIGNAL_CHANCE: (u32, u32) = (2, 100);

/// 30 seconds at 10 Hz
pub const HEADLIGHT_TOGGLE_TICKS: u64 = 300;

/// Random draws used by the simulator.
pub trait NoiseSource {
    /// Uniform integer in `low..=high`
    fn uniform(&mut self, low: i32, high: i32) -> i32;

    /// True with probability `numerator / denominator`
    fn chance(&mut self, numerator: u32, denominator: u32) -> bool;
}

/// Adapts any `rand` generator.
#[derive(Debug, Clone)]
pub struct RandomNoise<R: Rng>(pub R);

impl<R: Rng> NoiseSource for RandomNoise<R> {
    fn uniform(&mut self, low: i32, high: i32) -> i32 {
        self.0.gen_range(low..=high)
    }

    fn chance(&mut self, numerator: u32, denominator: u32) -> bool {
        self.0.gen_ratio(numerator, denominator)
    }
}

pub struct SimulationEngine {
    state: VehicleState,
    noise: Box<dyn NoiseSource + Send>,
    // Free-running, only reset by construction
    ticks: u64,
}

impl SimulationEngine {
    pub fn new() -> Self {
        Self::with_noise(RandomNoise(StdRng::from_entropy()))
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_noise(RandomNoise(StdRng::seed_from_u64(seed)))
    }

    pub fn with_noise<N: NoiseSource + Send + 'static>(noise: N) -> Self {
        Self {
            state: VehicleState::default(),
            noise: Box::new(noise),
            ticks: 0,
        }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Restore the default vehicle state. The headlight cadence keeps running.
    pub fn reset(&mut self) {
        self.state = VehicleState::default();
    }

    /// Advance the vehicle by one tick.
    pub fn step(&mut self) -> &VehicleState {
        let s = &mut self.state;
        let noise = &mut self.noise;

        let speed = i32::from(s.speed_kmh) + noise.uniform(-SPEED_STEP_KMH, SPEED_STEP_KMH);
        s.speed_kmh = speed.clamp(i32::from(SPEED_MIN_KMH), i32::from(SPEED_MAX_KMH)) as u16;

        let target_rpm = i32::from(IDLE_RPM) + i32::from(s.speed_kmh) * RPM_PER_KMH;
        let rpm = target_rpm + noise.uniform(-RPM_NOISE, RPM_NOISE);
        s.rpm = rpm.clamp(i32::from(RPM_MIN), i32::from(RPM_MAX)) as u16;

        if s.is_moving() && noise.chance(FUEL_BURN_CHANCE.0, FUEL_BURN_CHANCE.1) {
            s.fuel_percent = s.fuel_percent.saturating_sub(1);
        }

        let temp = i32::from(s.engine_temp_c) + noise.uniform(-TEMP_STEP_C, TEMP_STEP_C);
        s.engine_temp_c =
            temp.clamp(i32::from(ENGINE_TEMP_MIN_C), i32::from(ENGINE_TEMP_MAX_C)) as i16;

        // Each toggle clears the opposite side, so at most one signal is ever lit
        if noise.chance(TURN_SIGNAL_CHANCE.0, TURN_SIGNAL_CHANCE.1) {
            s.left_turn_signal = !s.left_turn_signal;
            s.right_turn_signal = false;
        }
        if noise.chance(TURN_SIGNAL_CHANCE.0, TURN_SIGNAL_CHANCE.1) {
            s.right_turn_signal = !s.right_turn_signal;
            s.left_turn_signal = false;
        }

        self.ticks += 1;
        if self.ticks % HEADLIGHT_TOGGLE_TICKS == 0 {
            s.headlights = !s.headlights;
        }

        debug_assert!(s.in_range(), "Vehicle state out of range: {:?}", s);
        debug_assert!(
            !(s.left_turn_signal && s.right_turn_signal),
            "Both turn signals active"
        );

        &self.state
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("state", &self.state)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}
