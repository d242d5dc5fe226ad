//! Error types shared by the bus controller, its adapters and the runtime.

use thiserror::Error;

/// Faults raised while talking to a bus or handling frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// No transport is available for the named interface
    #[error("Failed to create CAN device for interface {interface}: {reason}")]
    DeviceCreationFailed { interface: String, reason: String },

    /// The transport exists but the handshake failed
    #[error("Failed to connect to CAN interface {interface}: {reason}")]
    ConnectFailed { interface: String, reason: String },

    /// Runtime fault reported by a connected adapter
    #[error("CAN bus error: {0}")]
    Bus(String),

    /// Payload length other than 8 bytes
    #[error("Invalid frame: payload must be 8 bytes, got {len}")]
    InvalidFrame { len: usize },

    /// Frame identifier outside the known message family
    #[error("Unknown message identifier 0x{0:03X}")]
    UnknownMessage(u32),

    /// The controller task is no longer running
    #[error("Controller channel closed")]
    ChannelClosed,
}

/// Errors while loading or validating a [`crate::config::ControllerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
