//! Event loop owning a [`BusController`].
//!
//! One task holds the controller and is the only code touching it, so
//! commands, adapter callbacks and simulation ticks never interleave. The
//! tick interval only exists while simulation is active; leaving simulation
//! drops it on the spot.

use crate::adapter::{EventReceiver, VirtualBus};
use crate::config::ControllerConfig;
use crate::connection::ConnectionState;
use crate::controller::{BusController, Notification};
use crate::error::{BusError, ConfigError};
use crate::vehicle::VehicleState;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

const COMMAND_QUEUE_SIZE: usize = 32;
const NOTIFICATION_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub state: ConnectionState,
    pub status: String,
    pub connected: bool,
    pub vehicle: VehicleState,
}

#[derive(Debug)]
enum ControlCommand {
    ConnectToSimulator,
    ConnectToBus(String),
    DisconnectFromSimulator,
    SendFrame {
        id: u32,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), BusError>>,
    },
    Snapshot(oneshot::Sender<ControllerSnapshot>),
    Shutdown,
}

/// Cloneable front door to a running controller task.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<ControlCommand>,
    notifications: broadcast::Sender<Notification>,
}

impl ControllerHandle {
    /// Move `controller` onto its own task. A zero `tick_interval` is rejected.
    pub fn spawn(
        mut controller: BusController,
        events: EventReceiver,
        tick_interval: Duration,
    ) -> Result<(Self, JoinHandle<()>), ConfigError> {
        if tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "tick interval must be greater than zero".to_string(),
            ));
        }

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER_SIZE);

        let tx = notifications.clone();
        controller.subscribe(move |notification| {
            // No receivers is fine
            let _ = tx.send(notification.clone());
        });

        let task = tokio::spawn(run(controller, events, commands_rx, tick_interval));
        let handle = Self {
            commands: commands_tx,
            notifications,
        };
        Ok((handle, task))
    }

    /// Validate `config`, build a controller from it and spawn it. The
    /// virtual bus is returned so callers can attach peers to it.
    pub fn from_config(
        config: &ControllerConfig,
    ) -> Result<(Self, JoinHandle<()>, Option<VirtualBus>), ConfigError> {
        config.validate()?;
        let (factory, bus) = config.factory();
        let (controller, events) = BusController::new(factory, config.engine(), &config.interface);
        let (handle, task) = Self::spawn(controller, events, config.tick_interval())?;
        Ok((handle, task, bus))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    async fn send(&self, command: ControlCommand) -> Result<(), BusError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BusError::ChannelClosed)
    }

    pub async fn connect_to_simulator(&self) -> Result<(), BusError> {
        self.send(ControlCommand::ConnectToSimulator).await
    }

    pub async fn connect_to_bus(&self, interface: &str) -> Result<(), BusError> {
        self.send(ControlCommand::ConnectToBus(interface.to_string()))
            .await
    }

    pub async fn disconnect_from_simulator(&self) -> Result<(), BusError> {
        self.send(ControlCommand::DisconnectFromSimulator).await
    }

    pub async fn send_frame(&self, id: u32, payload: &[u8]) -> Result<(), BusError> {
        let (reply, response) = oneshot::channel();
        self.send(ControlCommand::SendFrame {
            id,
            payload: payload.to_vec(),
            reply,
        })
        .await?;
        response.await.map_err(|_| BusError::ChannelClosed)?
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot, BusError> {
        let (reply, response) = oneshot::channel();
        self.send(ControlCommand::Snapshot(reply)).await?;
        response.await.map_err(|_| BusError::ChannelClosed)
    }

    pub async fn shutdown(&self) -> Result<(), BusError> {
        self.send(ControlCommand::Shutdown).await
    }
}

fn snapshot(controller: &BusController) -> ControllerSnapshot {
    ControllerSnapshot {
        state: controller.state().clone(),
        status: controller.status().to_string(),
        connected: controller.is_connected(),
        vehicle: *controller.vehicle(),
    }
}

/// Start or stop the tick source to match the current mode.
fn sync_ticker(controller: &BusController, ticker: &mut Option<Interval>, period: Duration) {
    match (controller.is_simulating(), ticker.is_some()) {
        (true, false) => {
            // First tick one full period after entering simulation
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *ticker = Some(interval);
            debug!("Simulation ticks started every {:?}", period);
        }
        (false, true) => {
            *ticker = None;
            debug!("Simulation ticks stopped");
        }
        _ => {}
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn apply(controller: &mut BusController, command: ControlCommand) {
    match command {
        ControlCommand::ConnectToSimulator => controller.connect_to_simulator(),
        ControlCommand::ConnectToBus(interface) => controller.connect_to_bus(&interface),
        ControlCommand::DisconnectFromSimulator => controller.disconnect_from_simulator(),
        ControlCommand::SendFrame { id, payload, reply } => {
            let _ = reply.send(controller.send_frame(id, &payload));
        }
        ControlCommand::Snapshot(reply) => {
            let _ = reply.send(snapshot(controller));
        }
        // Handled by the loop
        ControlCommand::Shutdown => {}
    }
}

async fn run(
    mut controller: BusController,
    mut events: EventReceiver,
    mut commands: mpsc::Receiver<ControlCommand>,
    period: Duration,
) {
    let mut ticker: Option<Interval> = None;
    info!("Bus controller running");

    loop {
        sync_ticker(&controller, &mut ticker, period);

        tokio::select! {
            command = commands.recv() => match command {
                None | Some(ControlCommand::Shutdown) => break,
                Some(command) => apply(&mut controller, command),
            },
            Some(event) = events.recv() => controller.handle_adapter_event(event),
            () = next_tick(&mut ticker) => {
                controller.tick();
            }
        }
    }

    info!("Bus controller stopped");
}
