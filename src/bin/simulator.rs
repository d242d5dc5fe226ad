use clap::{App, Arg};
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn, Level};
use vehbus::adapter::VirtualBus;
use vehbus::config::{ControllerConfig, StartMode};
use vehbus::encoder;
use vehbus::simulation::SimulationEngine;
use vehbus::{ControllerHandle, Notification};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("vehbus-sim")
        .version("0.1.0")
        .about("Runs the vehicle bus controller and logs every frame it produces")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON controller configuration")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("duration")
                .short("d")
                .long("duration")
                .value_name("SECONDS")
                .help("Stop after this many seconds (runs until Ctrl+C otherwise)")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Duration must be a whole number of seconds".into()),
                }),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log individual frames"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match matches.value_of("config") {
        Some(path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig::default(),
    };
    info!("Starting with {:?}", config);

    let (handle, task, bus) = ControllerHandle::from_config(&config)?;
    let mut notifications = handle.subscribe();

    if let Some(bus) = bus {
        let ecu = virtual_ecu(bus, config.clone())?;
        tokio::spawn(ecu);
    }

    match config.start_mode {
        StartMode::Idle => {}
        StartMode::Simulation => handle.connect_to_simulator().await?,
        StartMode::Hardware => handle.connect_to_bus(&config.interface).await?,
    }

    let deadline = matches
        .value_of("duration")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
    let stop = async move {
        match deadline {
            Some(d) => time::sleep(d).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
            }
        }
    };
    tokio::pin!(stop);

    let mut frames: u64 = 0;
    loop {
        tokio::select! {
            () = &mut stop => break,
            received = notifications.recv() => match received {
                Ok(Notification::FrameReceived(frame)) => {
                    frames += 1;
                    tracing::debug!("{}", frame);
                }
                Ok(Notification::StatusChanged(status)) => info!("Status: {}", status),
                Ok(Notification::ConnectedChanged(connected)) => info!("Connected: {}", connected),
                Ok(Notification::ErrorOccurred(message)) => warn!("Bus error: {}", message),
                Err(e) => warn!("Notifications dropped: {}", e),
            },
        }
    }

    handle.shutdown().await?;
    task.await?;
    info!("Stopped after {} frames", frames);
    Ok(())
}

/// A stand-in ECU on the virtual segment, broadcasting its own vehicle.
fn virtual_ecu(
    bus: VirtualBus,
    config: ControllerConfig,
) -> Result<impl std::future::Future<Output = ()>, vehbus::BusError> {
    let peer = bus.peer(&config.interface)?;
    let mut engine = match config.seed {
        Some(seed) => SimulationEngine::with_seed(seed.wrapping_add(1)),
        None => SimulationEngine::new(),
    };

    Ok(async move {
        let mut interval = time::interval(config.tick_interval());
        loop {
            interval.tick().await;
            let state = *engine.step();
            for frame in encoder::encode_all(&state) {
                if let Err(e) = peer.send(frame) {
                    warn!("Virtual ECU stopped: {}", e);
                    return;
                }
            }
        }
    })
}
