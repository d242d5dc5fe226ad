//! Mode state machine deciding which data source owns the bus.
//!
//! Exactly one source is authoritative at a time: the simulator while the
//! state is [`ConnectionState::SimulationActive`], a hardware adapter while
//! it is `ConnectingToHardware` or `ConnectedToHardware`, nothing otherwise.
//! The adapter handle only exists in the two hardware states and is torn
//! down on every transition out of them.

use crate::adapter::{
    interface_name, AdapterEvent, AdapterFactory, BusAdapter, DeviceState, EventReceiver,
    EventSink, SessionEvent, SessionId,
};
use crate::controller::Notification;
use crate::error::BusError;
use crate::frame::CanFrame;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

pub const STATUS_DISCONNECTED: &str = "Disconnected";
pub const STATUS_SIMULATION: &str = "Simulation Mode Active";
pub const STATUS_CONNECTING_REQUESTED: &str = "Connecting to CAN Bus...";
pub const STATUS_CONNECTING: &str = "Connecting to CAN Bus";
pub const STATUS_CONNECTED: &str = "Connected to CAN Bus";
pub const STATUS_BUS_DISCONNECTED: &str = "Disconnected from CAN Bus";
pub const STATUS_NO_BUS: &str = "CAN Control Mode (No CAN Bus Available)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    SimulationActive,
    ConnectingToHardware,
    ConnectedToHardware,
    HardwareUnavailable,
    Error(String),
}

impl ConnectionState {
    /// Whether consumers should treat the bus as live.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::SimulationActive | ConnectionState::ConnectedToHardware
        )
    }

    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            ConnectionState::ConnectingToHardware | ConnectionState::ConnectedToHardware
        )
    }
}

/// How a hardware request reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePolicy {
    /// Explicit `connect_to_bus`: explain the failure and raise an error
    Report,
    /// Leaving simulation: settle quietly into CAN control mode
    ControlMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Announce {
    /// Connected flag only when it changed
    OnChange,
    /// Adapter-driven transitions and control-mode fallback always repeat it
    Always,
}

struct ActiveAdapter {
    session: SessionId,
    device: Box<dyn BusAdapter>,
}

pub struct ConnectionManager {
    state: ConnectionState,
    status: String,
    factory: Box<dyn AdapterFactory>,
    adapter: Option<ActiveAdapter>,
    next_session: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    outbox: Vec<Notification>,
}

impl ConnectionManager {
    /// Build a manager and the channel its adapters report through.
    pub fn new(factory: Box<dyn AdapterFactory>) -> (Self, EventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            state: ConnectionState::Disconnected,
            status: STATUS_DISCONNECTED.to_string(),
            factory,
            adapter: None,
            next_session: 0,
            events_tx,
            outbox: Vec::new(),
        };
        (manager, events_rx)
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn has_adapter(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.adapter.as_ref().map(|a| a.session)
    }

    /// Notifications produced since the last drain, in emission order.
    pub fn drain_notifications(&mut self) -> std::vec::Drain<'_, Notification> {
        self.outbox.drain(..)
    }

    /// Enter simulation from anywhere. Returns false if it was already active.
    pub fn request_simulation(&mut self) -> bool {
        if self.state == ConnectionState::SimulationActive {
            return false;
        }
        self.release_adapter();
        self.enter(
            ConnectionState::SimulationActive,
            STATUS_SIMULATION.to_string(),
            Announce::OnChange,
        );
        info!("Switched to simulation mode");
        true
    }

    /// Try to open `interface`; no-op while hardware already owns the bus.
    pub fn request_hardware(&mut self, interface: &str) {
        if self.state.is_hardware() {
            debug!("Hardware already active, ignoring request for {}", interface);
            return;
        }
        self.attach(interface, FailurePolicy::Report);
    }

    /// Leave simulation and fall into CAN control mode, with or without a bus.
    pub fn request_hardware_or_fallback(&mut self, interface: &str) {
        self.release_adapter();
        self.attach(interface, FailurePolicy::ControlMode);
    }

    /// Relay a frame to the adapter. Dropped unless fully connected.
    pub fn send_frame(&mut self, frame: &CanFrame) {
        if self.state != ConnectionState::ConnectedToHardware {
            trace!("Dropping {} while {:?}", frame, self.state);
            return;
        }
        if let Some(active) = self.adapter.as_mut() {
            if let Err(e) = active.device.send(frame) {
                warn!("Failed to send {}: {}", frame, e);
            }
        }
    }

    pub fn handle_adapter_event(&mut self, event: SessionEvent) {
        if self.current_session() != Some(event.session) {
            trace!("Discarding event from released session {:?}", event.session);
            return;
        }

        match event.event {
            AdapterEvent::FramesReceived(frames) => {
                for frame in frames {
                    self.outbox.push(Notification::FrameReceived(frame));
                }
            }
            AdapterEvent::StateChanged(DeviceState::Connected) => {
                self.enter(
                    ConnectionState::ConnectedToHardware,
                    STATUS_CONNECTED.to_string(),
                    Announce::Always,
                );
            }
            AdapterEvent::StateChanged(DeviceState::Connecting) => {
                self.enter(
                    ConnectionState::ConnectingToHardware,
                    STATUS_CONNECTING.to_string(),
                    Announce::Always,
                );
            }
            AdapterEvent::StateChanged(DeviceState::Unconnected) => {
                self.release_adapter();
                self.enter(
                    ConnectionState::Disconnected,
                    STATUS_BUS_DISCONNECTED.to_string(),
                    Announce::Always,
                );
            }
            AdapterEvent::ErrorOccurred(message) => {
                warn!("CAN bus error: {}", message);
                self.release_adapter();
                self.enter(
                    ConnectionState::Error(message.clone()),
                    format!("Error: {message}"),
                    Announce::Always,
                );
                self.outbox.push(Notification::ErrorOccurred(message));
            }
        }
    }

    fn attach(&mut self, interface: &str, policy: FailurePolicy) {
        info!("Attempting to connect to CAN interface: {}", interface);
        match self.open_adapter(interface) {
            Ok(active) => {
                self.adapter = Some(active);
                self.enter(
                    ConnectionState::ConnectingToHardware,
                    STATUS_CONNECTING_REQUESTED.to_string(),
                    Announce::OnChange,
                );
            }
            Err(e) => {
                warn!("{}", e);
                match policy {
                    FailurePolicy::Report => {
                        self.enter(
                            ConnectionState::HardwareUnavailable,
                            format!("CAN Bus Unavailable: {e}"),
                            Announce::OnChange,
                        );
                        self.outbox.push(Notification::ErrorOccurred(e.to_string()));
                    }
                    FailurePolicy::ControlMode => {
                        self.enter(
                            ConnectionState::HardwareUnavailable,
                            STATUS_NO_BUS.to_string(),
                            Announce::Always,
                        );
                        info!("Switched to CAN control mode, but no CAN bus available");
                    }
                }
            }
        }
    }

    fn open_adapter(&mut self, interface: &str) -> Result<ActiveAdapter, BusError> {
        let name = interface_name(interface)?;
        self.next_session += 1;
        let session = SessionId(self.next_session);
        let sink = EventSink::new(session, self.events_tx.clone());

        let mut device = self.factory.create(&name, sink).inspect_err(|_| {
            debug!("Available interfaces: {:?}", self.factory.available_interfaces());
        })?;

        // A half-open device is dropped here on failure
        if let Err(e) = device.connect() {
            device.disconnect();
            return Err(e);
        }
        Ok(ActiveAdapter { session, device })
    }

    fn release_adapter(&mut self) {
        if let Some(mut active) = self.adapter.take() {
            debug!(
                "Releasing adapter on {} (session {:?})",
                active.device.interface(),
                active.session
            );
            active.device.disconnect();
        }
    }

    fn enter(&mut self, state: ConnectionState, status: String, announce: Announce) {
        let was_connected = self.state.is_connected();
        self.state = state;
        self.status = status;

        let connected = self.state.is_connected();
        if announce == Announce::Always || connected != was_connected {
            self.outbox.push(Notification::ConnectedChanged(connected));
        }
        self.outbox
            .push(Notification::StatusChanged(self.status.clone()));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.release_adapter();
    }
}

impl core::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("session", &self.current_session())
            .finish_non_exhaustive()
    }
}
