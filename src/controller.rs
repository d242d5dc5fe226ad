use crate::adapter::{AdapterFactory, EventReceiver, SessionEvent};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::encoder;
use crate::error::BusError;
use crate::frame::CanFrame;
use crate::simulation::SimulationEngine;
use crate::vehicle::VehicleState;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Everything the controller reports to its listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    ConnectedChanged(bool),
    StatusChanged(String),
    FrameReceived(CanFrame),
    ErrorOccurred(String),
}

type Listener = Box<dyn FnMut(&Notification) + Send>;

/// Mode-independent front end of the vehicle bus.
///
/// Frames surface through [`Notification::FrameReceived`] whether they were
/// synthesized by the simulator or relayed from a hardware adapter.
pub struct BusController {
    connection: ConnectionManager,
    engine: SimulationEngine,
    listeners: Vec<Listener>,
    fallback_interface: String,
}

impl BusController {
    /// `fallback_interface` is the bus tried when leaving simulation.
    pub fn new(
        factory: Box<dyn AdapterFactory>,
        engine: SimulationEngine,
        fallback_interface: &str,
    ) -> (Self, EventReceiver) {
        let (connection, events) = ConnectionManager::new(factory);
        let controller = Self {
            connection,
            engine,
            listeners: Vec::new(),
            fallback_interface: fallback_interface.to_string(),
        };
        (controller, events)
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&Notification) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn state(&self) -> &ConnectionState {
        self.connection.state()
    }

    pub fn status(&self) -> &str {
        self.connection.status()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_simulating(&self) -> bool {
        *self.connection.state() == ConnectionState::SimulationActive
    }

    pub fn vehicle(&self) -> &VehicleState {
        self.engine.state()
    }

    pub fn fallback_interface(&self) -> &str {
        &self.fallback_interface
    }

    /// Switch to simulated data. Always allowed; a no-op when already simulating.
    pub fn connect_to_simulator(&mut self) {
        if self.connection.request_simulation() {
            self.engine.reset();
        }
        self.flush();
    }

    pub fn connect_to_bus(&mut self, interface: &str) {
        self.connection.request_hardware(interface);
        self.flush();
    }

    /// Leave simulation and try the fallback interface.
    pub fn disconnect_from_simulator(&mut self) {
        let interface = self.fallback_interface.clone();
        self.connection.request_hardware_or_fallback(&interface);
        self.flush();
    }

    /// Fire-and-forget transmit. Only the payload length is checked.
    pub fn send_frame(&mut self, id: u32, payload: &[u8]) -> Result<(), BusError> {
        let frame = CanFrame::from_slice(id, payload)?;
        self.connection.send_frame(&frame);
        Ok(())
    }

    /// Run one simulation step. Returns false when simulation is not active.
    pub fn tick(&mut self) -> bool {
        if !self.is_simulating() {
            return false;
        }
        let state = *self.engine.step();
        for frame in encoder::encode_all(&state) {
            self.emit(&Notification::FrameReceived(frame));
        }
        true
    }

    pub fn handle_adapter_event(&mut self, event: SessionEvent) {
        self.connection.handle_adapter_event(event);
        self.flush();
    }

    /// Handle every adapter event already queued. Returns how many were seen.
    pub fn pump_events(&mut self, events: &mut EventReceiver) -> usize {
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.handle_adapter_event(event);
            handled += 1;
        }
        handled
    }

    fn flush(&mut self) {
        let pending: Vec<Notification> = self.connection.drain_notifications().collect();
        for notification in &pending {
            self.emit(notification);
        }
    }

    fn emit(&mut self, notification: &Notification) {
        if let Notification::StatusChanged(status) = notification {
            debug!("Status: {}", status);
        }
        for listener in &mut self.listeners {
            listener(notification);
        }
    }
}

impl core::fmt::Debug for BusController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BusController")
            .field("connection", &self.connection)
            .field("engine", &self.engine)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
