use vehbus::simulation::{NoiseSource, SimulationEngine};
use vehbus::vehicle::*;

/// Alternates between the extremes of every draw.
struct Swing {
    count: u64,
    period: u64,
}

impl NoiseSource for Swing {
    fn uniform(&mut self, low: i32, high: i32) -> i32 {
        self.count += 1;
        if (self.count / self.period) % 2 == 0 { high } else { low }
    }

    fn chance(&mut self, _numerator: u32, _denominator: u32) -> bool {
        self.count % 3 == 0
    }
}

fn assert_invariants(state: &VehicleState) {
    assert!(state.speed_kmh <= SPEED_MAX_KMH, "speed {}", state.speed_kmh);
    assert!((RPM_MIN..=RPM_MAX).contains(&state.rpm), "rpm {}", state.rpm);
    assert!(state.fuel_percent <= FUEL_MAX_PERCENT, "fuel {}", state.fuel_percent);
    assert!(
        (ENGINE_TEMP_MIN_C..=ENGINE_TEMP_MAX_C).contains(&state.engine_temp_c),
        "temp {}",
        state.engine_temp_c
    );
    assert!(!(state.left_turn_signal && state.right_turn_signal));
    assert_eq!(state.engine_running(), state.rpm > 500);
}

#[cfg(test)]
mod bounded_signal_tests {
    use super::*;

    #[test]
    fn test_random_runs_stay_in_range() {
        for seed in 0..20 {
            let mut engine = SimulationEngine::with_seed(seed);
            for _ in 0..2_000 {
                assert_invariants(engine.step());
            }
        }
    }

    #[test]
    fn test_entropy_seeded_run_stays_in_range() {
        let mut engine = SimulationEngine::new();
        for _ in 0..5_000 {
            assert_invariants(engine.step());
        }
    }

    #[test]
    fn test_adversarial_swings_stay_in_range() {
        for period in [1, 7, 50, 400] {
            let mut engine = SimulationEngine::with_noise(Swing { count: 0, period });
            for _ in 0..3_000 {
                assert_invariants(engine.step());
            }
        }
    }
}

#[cfg(test)]
mod correlation_tests {
    use super::*;

    #[test]
    fn test_speed_changes_at_most_two_per_tick() {
        let mut engine = SimulationEngine::with_seed(11);
        let mut previous = engine.state().speed_kmh;
        for _ in 0..1_000 {
            let speed = engine.step().speed_kmh;
            assert!(speed.abs_diff(previous) <= 2);
            previous = speed;
        }
    }

    #[test]
    fn test_rpm_tracks_speed() {
        let mut engine = SimulationEngine::with_seed(5);
        for _ in 0..1_000 {
            let state = engine.step();
            let target = 800 + i32::from(state.speed_kmh) * 25;
            let rpm = i32::from(state.rpm);
            // Noise is +/-100 unless clamped at idle
            assert!(rpm >= (target - 100).max(700) && rpm <= target + 100);
        }
    }

    #[test]
    fn test_temperature_drifts_slowly() {
        let mut engine = SimulationEngine::with_seed(23);
        let mut previous = engine.state().engine_temp_c;
        for _ in 0..1_000 {
            let temp = engine.step().engine_temp_c;
            assert!((temp - previous).abs() <= 1);
            previous = temp;
        }
    }

    #[test]
    fn test_fuel_never_increases() {
        let mut engine = SimulationEngine::with_seed(99);
        let mut previous = engine.state().fuel_percent;
        for _ in 0..10_000 {
            let fuel = engine.step().fuel_percent;
            assert!(fuel <= previous);
            previous = fuel;
        }
    }

    #[test]
    fn test_turn_signals_do_toggle() {
        let mut engine = SimulationEngine::with_seed(8);
        let mut seen_left = false;
        let mut seen_right = false;
        for _ in 0..2_000 {
            let state = engine.step();
            seen_left |= state.left_turn_signal;
            seen_right |= state.right_turn_signal;
        }
        assert!(seen_left && seen_right);
    }
}
