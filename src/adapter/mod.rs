//! Hardware transport contract.
//!
//! The controller never talks to a bus driver directly. It asks an
//! [`AdapterFactory`] for a [`BusAdapter`] bound to an interface name and
//! listens to the [`AdapterEvent`]s that adapter pushes through its
//! [`EventSink`]. Which factory is used is decided once at startup from
//! configuration.

pub mod unavailable;
pub mod virtual_bus;

pub use unavailable::NoHardware;
pub use virtual_bus::{VirtualAdapter, VirtualBus, VirtualPeer};

use crate::error::BusError;
use crate::frame::CanFrame;
use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Linux `IFNAMSIZ`, terminating NUL included
pub const MAX_INTERFACE_NAME: usize = 16;

pub type InterfaceName = ArrayString<MAX_INTERFACE_NAME>;

pub fn interface_name(name: &str) -> Result<InterfaceName, BusError> {
    if name.is_empty() || name.len() >= MAX_INTERFACE_NAME {
        return Err(BusError::DeviceCreationFailed {
            interface: name.to_string(),
            reason: "invalid interface name".to_string(),
        });
    }
    ArrayString::from(name).map_err(|_| BusError::DeviceCreationFailed {
        interface: name.to_string(),
        reason: "invalid interface name".to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Unconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    FramesReceived(Vec<CanFrame>),
    StateChanged(DeviceState),
    ErrorOccurred(String),
}

/// Identifies one adapter instance for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: AdapterEvent,
}

pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Where an adapter delivers its asynchronous notifications.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Returns false once the controller side has gone away.
    pub fn emit(&self, event: AdapterEvent) -> bool {
        self.tx
            .send(SessionEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// A connected (or connecting) hardware device.
pub trait BusAdapter: Send {
    fn interface(&self) -> &str;

    fn connect(&mut self) -> Result<(), BusError>;

    fn disconnect(&mut self);

    fn send(&mut self, frame: &CanFrame) -> Result<(), BusError>;
}

/// Creates adapters for named interfaces.
pub trait AdapterFactory: Send {
    fn create(
        &self,
        interface: &InterfaceName,
        events: EventSink,
    ) -> Result<Box<dyn BusAdapter>, BusError>;

    /// Interfaces this factory could open, for diagnostics.
    fn available_interfaces(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_name_limits() {
        assert_eq!(interface_name("vcan0").unwrap().as_str(), "vcan0");
        assert!(interface_name("").is_err());
        assert!(interface_name("fifteen_chars__").is_ok());
        assert!(interface_name("sixteen_chars___").is_err());
    }

    #[test]
    fn test_sink_reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(SessionId(4), tx);
        assert!(sink.emit(AdapterEvent::StateChanged(DeviceState::Connecting)));
        drop(rx);
        assert!(!sink.emit(AdapterEvent::StateChanged(DeviceState::Connected)));
    }
}
