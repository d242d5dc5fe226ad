use vehbus::encoder::*;
use vehbus::frame::{CanFrame, MessageId};
use vehbus::simulation::SimulationEngine;
use vehbus::vehicle::VehicleState;

fn vehicle(speed_kmh: u16, rpm: u16) -> VehicleState {
    VehicleState {
        speed_kmh,
        rpm,
        ..VehicleState::default()
    }
}

#[cfg(test)]
mod frame_layout_tests {
    use super::*;

    #[test]
    fn test_speed_45_layout() {
        let frame = encode_vehicle_speed(&vehicle(45, 1925));
        assert_eq!(frame.payload(), &[194, 1, 194, 1, 194, 1, 194, 1]);
    }

    #[test]
    fn test_max_speed_fits_u16() {
        let frame = encode_vehicle_speed(&vehicle(120, 3800));
        assert_eq!(&frame.payload()[..2], &1200u16.to_le_bytes());
    }

    #[test]
    fn test_rpm_little_endian() {
        let frame = encode_engine_data(&vehicle(0, 6000));
        assert_eq!(u16::from_le_bytes([frame.payload()[0], frame.payload()[1]]), 24000);
    }

    #[test]
    fn test_constant_fields() {
        let frame = encode_engine_data(&vehicle(60, 2300));
        assert_eq!(frame.payload()[2], 50);
        assert_eq!(frame.payload()[5], 150);
        assert_eq!(frame.payload()[6], 0);
    }

    #[test]
    fn test_unused_bytes_are_zero() {
        let state = VehicleState {
            speed_kmh: 88,
            left_turn_signal: true,
            headlights: true,
            ..VehicleState::default()
        };
        let transmission = encode_transmission(&state);
        assert_eq!(transmission.payload()[1], 0);
        assert!(transmission.payload()[3..].iter().all(|&b| b == 0));

        let battery = encode_battery(&state);
        assert!(battery.payload()[2..].iter().all(|&b| b == 0));

        let lights = encode_warning_lights(&state);
        assert_eq!(lights.payload()[0], 0);
        assert_eq!(lights.payload()[1], 0x05);
        assert!(lights.payload()[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_gear_boundaries() {
        let parked = encode_transmission(&vehicle(0, 800));
        assert_eq!(parked.payload()[0] & 0x0F, 0);
        assert_eq!(parked.payload()[2], 0x02);

        let moving = encode_transmission(&vehicle(30, 1550));
        assert_eq!(moving.payload()[0] & 0x0F, 3);
        assert_eq!(moving.payload()[2], 0x00);

        let creeping = encode_transmission(&vehicle(1, 825));
        assert_eq!(creeping.payload()[0] & 0x0F, 3);
    }
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    #[test]
    fn test_decode_recovers_simulated_state() {
        let mut engine = SimulationEngine::with_seed(2024);
        for _ in 0..300 {
            let state = *engine.step();
            for frame in encode_all(&state) {
                match decode(&frame).unwrap() {
                    DecodedSignals::Engine { rpm, coolant_temp_c, throttle_percent, .. } => {
                        assert_eq!(rpm, f32::from(state.rpm));
                        assert_eq!(coolant_temp_c, state.engine_temp_c);
                        assert_eq!(u16::from(throttle_percent), (state.speed_kmh * 2).min(100));
                    }
                    DecodedSignals::Speed { speed_kmh, .. } => {
                        assert_eq!(speed_kmh, f32::from(state.speed_kmh));
                    }
                    DecodedSignals::Transmission { gear, park } => {
                        assert_eq!(park, state.speed_kmh == 0);
                        assert_eq!(gear == Gear::Drive, state.speed_kmh > 0);
                    }
                    DecodedSignals::Battery { voltage } => {
                        assert_eq!(voltage, if state.engine_running() { 14.0 } else { 12.0 });
                    }
                    DecodedSignals::Warnings { warnings, left_turn_signal, right_turn_signal, headlights } => {
                        assert_eq!(warnings, 0);
                        assert_eq!(left_turn_signal, state.left_turn_signal);
                        assert_eq!(right_turn_signal, state.right_turn_signal);
                        assert_eq!(headlights, state.headlights);
                    }
                }
            }
        }
    }

    #[test]
    fn test_decode_hardware_frame() {
        // As another ECU would send it: 3000 rpm, 95 C, 40% fuel
        let frame = CanFrame::new(0x100, [0xE0, 0x2E, 30, 135, 20, 100, 0, 102]);
        match decode(&frame).unwrap() {
            DecodedSignals::Engine { rpm, coolant_temp_c, fuel_percent, load_percent, .. } => {
                assert_eq!(rpm, 3000.0);
                assert_eq!(coolant_temp_c, 95);
                assert_eq!(load_percent, 30);
                assert!((fuel_percent - 40.0).abs() < 0.1);
            }
            other => panic!("Expected engine signals, got {:?}", other),
        }
    }

    #[test]
    fn test_other_gears() {
        let reverse = CanFrame::new(MessageId::TransmissionData.raw(), [0xF1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            decode(&reverse).unwrap(),
            DecodedSignals::Transmission { gear: Gear::Reverse, park: false }
        );
        let odd = CanFrame::new(MessageId::TransmissionData.raw(), [0x09, 0, 0x02, 0, 0, 0, 0, 0]);
        assert_eq!(
            decode(&odd).unwrap(),
            DecodedSignals::Transmission { gear: Gear::Other(9), park: true }
        );
    }
}
