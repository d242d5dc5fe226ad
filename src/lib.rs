//! # Vehicle Bus Controller
//!
//! A single, mode-independent interface for sending and receiving fixed
//! 8-byte vehicle frames. Internally the controller switches between a
//! hardware CAN transport and a self-driving simulator that produces
//! plausible, bounded vehicle signals ten times per second.
//!
//! ## Quick Start
//!
//! ```rust
//! use vehbus::adapter::NoHardware;
//! use vehbus::controller::{BusController, Notification};
//! use vehbus::simulation::SimulationEngine;
//!
//! let (mut controller, _events) =
//!     BusController::new(Box::new(NoHardware), SimulationEngine::with_seed(7), "vcan0");
//! controller.subscribe(|n| {
//!     if let Notification::FrameReceived(frame) = n {
//!         println!("{}", frame);
//!     }
//! });
//!
//! controller.connect_to_simulator();
//! assert!(controller.tick());
//! ```
//!
//! ## Architecture
//!
//! - [`connection`] - Mode state machine and adapter lifetime
//! - [`adapter`] - Hardware transport contract and its implementations
//! - [`simulation`] - Per-tick evolution of the vehicle state
//! - [`encoder`] - Frame pack/unpack table
//! - [`controller`] - Public operations and notifications
//! - [`runtime`] - Async event loop driving a controller

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod adapter;
pub mod config;
pub mod connection;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod runtime;
pub mod simulation;
pub mod vehicle;

// Re-export main public types for convenience
pub use config::ControllerConfig;
pub use connection::ConnectionState;
pub use controller::{BusController, Notification};
pub use error::BusError;
pub use frame::{CanFrame, MessageId};
pub use runtime::ControllerHandle;
pub use vehicle::VehicleState;
