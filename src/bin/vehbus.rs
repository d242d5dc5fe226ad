use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use std::sync::{Arc, Mutex};
use vehbus::adapter::NoHardware;
use vehbus::config::ControllerConfig;
use vehbus::encoder::{self, DecodedSignals, Gear};
use vehbus::simulation::SimulationEngine;
use vehbus::{BusController, CanFrame, MessageId, Notification};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("vehbus")
        .version("0.1.0")
        .author("Vehicle Systems Engineering Team")
        .about("🚗 Vehicle bus tools - decode frames and run the signal simulator offline")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("decode")
                .about("🔍 Decode one frame of the vehicle message family")
                .arg(
                    Arg::with_name("id")
                        .help("Frame identifier, e.g. 0x200")
                        .required(true),
                )
                .arg(
                    Arg::with_name("payload")
                        .help("Eight payload bytes in hex, e.g. C2 01 C2 01 C2 01 C2 01")
                        .required(true)
                        .multiple(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("🏎️  Run the simulator for a number of ticks and print its frames")
                .arg(
                    Arg::with_name("ticks")
                        .short("n")
                        .long("ticks")
                        .value_name("COUNT")
                        .help("Number of 100 ms ticks to run")
                        .takes_value(true)
                        .default_value("10")
                        .validator(|v| match v.parse::<u32>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Tick count must be a positive number".into()),
                        }),
                )
                .arg(
                    Arg::with_name("seed")
                        .short("s")
                        .long("seed")
                        .value_name("SEED")
                        .help("Seed for reproducible runs")
                        .takes_value(true)
                        .validator(|v| match v.parse::<u64>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Seed must be a valid number".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("config")
                .about("⚙️  Print the default configuration or validate a config file")
                .arg(
                    Arg::with_name("file")
                        .help("Config file to validate")
                        .required(false),
                ),
        )
        .get_matches();

    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("decode", Some(sub_matches)) => handle_decode(sub_matches, format)?,
        ("simulate", Some(sub_matches)) => handle_simulate(sub_matches, format)?,
        ("config", Some(sub_matches)) => handle_config(sub_matches)?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

fn parse_id(raw: &str) -> Result<u32, std::num::ParseIntError> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    }
}

fn parse_payload<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<u8>, std::num::ParseIntError> {
    let digits: String = parts
        .flat_map(|p| p.split(|c: char| c == ',' || c == ':' || c.is_whitespace()))
        .collect();
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| u8::from_str_radix(&String::from_utf8_lossy(pair), 16))
        .collect()
}

fn handle_decode(matches: &ArgMatches<'_>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let id = parse_id(matches.value_of("id").unwrap_or_default())?;
    let payload = parse_payload(matches.values_of("payload").into_iter().flatten())?;
    let frame = CanFrame::from_slice(id, &payload)?;
    let signals = encoder::decode(&frame)?;

    match format {
        "json" => println!("{}", serde_json::to_string(&signals)?),
        "compact" => println!("{} {:?}", frame, signals),
        _ => print_signals(&frame, &signals),
    }
    Ok(())
}

fn handle_simulate(matches: &ArgMatches<'_>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ticks: u32 = matches.value_of("ticks").unwrap_or("10").parse()?;
    let engine = match matches.value_of("seed") {
        Some(seed) => SimulationEngine::with_seed(seed.parse()?),
        None => SimulationEngine::new(),
    };

    let (mut controller, _events) =
        BusController::new(Box::new(NoHardware), engine, vehbus::config::DEFAULT_INTERFACE);
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    controller.subscribe(move |n| {
        if let Ok(mut log) = sink.lock() {
            log.push(n.clone());
        }
    });

    controller.connect_to_simulator();
    for tick in 0..=ticks {
        let notifications: Vec<Notification> = match log.lock() {
            Ok(mut log) => log.drain(..).collect(),
            Err(_) => break,
        };
        if !notifications.is_empty() {
            print_notifications(tick, &notifications, format)?;
        }
        if tick < ticks {
            controller.tick();
        }
    }

    if format == "table" {
        let vehicle = controller.vehicle();
        println!(
            "\n{} speed {} km/h, {} rpm, fuel {}%, coolant {}°C",
            "Final state:".bright_white().bold(),
            vehicle.speed_kmh.to_string().bright_cyan(),
            vehicle.rpm.to_string().bright_cyan(),
            vehicle.fuel_percent.to_string().bright_cyan(),
            vehicle.engine_temp_c.to_string().bright_cyan(),
        );
    }
    Ok(())
}

fn handle_config(matches: &ArgMatches<'_>) -> Result<(), Box<dyn std::error::Error>> {
    match matches.value_of("file") {
        Some(path) => {
            let config = ControllerConfig::from_file(path)?;
            println!("{} {}", "✅".green(), "Configuration is valid".bright_green());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        None => println!("{}", serde_json::to_string_pretty(&ControllerConfig::default())?),
    }
    Ok(())
}

fn print_notifications(
    tick: u32,
    notifications: &[Notification],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => {
            for n in notifications {
                println!("{}", serde_json::to_string(n)?);
            }
        }
        "compact" => {
            for n in notifications {
                match n {
                    Notification::FrameReceived(frame) => println!("{:>5} {}", tick, frame),
                    other => println!("{:>5} {:?}", tick, other),
                }
            }
        }
        _ => {
            println!("{}", format!("── tick {} ──", tick).bright_blue().bold());
            for n in notifications {
                match n {
                    Notification::FrameReceived(frame) => match encoder::decode(frame) {
                        Ok(signals) => print_signals(frame, &signals),
                        Err(_) => println!("  {}", frame),
                    },
                    Notification::StatusChanged(status) => {
                        println!("  {} {}", "Status:".bright_white(), status.bright_green())
                    }
                    Notification::ConnectedChanged(connected) => {
                        println!("  {} {}", "Connected:".bright_white(), connected)
                    }
                    Notification::ErrorOccurred(message) => {
                        println!("  {} {}", "Error:".bright_white(), message.bright_red())
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_signals(frame: &CanFrame, signals: &DecodedSignals) {
    let name = frame.message().map_or("Unknown", MessageId::name);
    let detail = match *signals {
        DecodedSignals::Engine {
            rpm,
            load_percent,
            coolant_temp_c,
            throttle_percent,
            fuel_percent,
            ..
        } => {
            let temp = format!("{}°C", coolant_temp_c);
            let temp = if coolant_temp_c > 105 { temp.red() } else { temp.white() };
            format!(
                "{:>6.0} rpm  load {}%  coolant {}  throttle {}%  fuel {:.1}%",
                rpm, load_percent, temp, throttle_percent, fuel_percent
            )
        }
        DecodedSignals::Speed { speed_kmh, .. } => format!("{:>6.1} km/h", speed_kmh),
        DecodedSignals::Transmission { gear, park } => {
            let gear = match gear {
                Gear::Park => "P".to_string(),
                Gear::Reverse => "R".to_string(),
                Gear::Neutral => "N".to_string(),
                Gear::Drive => "D".to_string(),
                Gear::Other(n) => format!("?{}", n),
            };
            format!("gear {}{}", gear, if park { "  (parked)" } else { "" })
        }
        DecodedSignals::Battery { voltage } => {
            let volts = format!("{:.2} V", voltage);
            if voltage < 13.0 { volts.yellow().to_string() } else { volts.green().to_string() }
        }
        DecodedSignals::Warnings {
            left_turn_signal,
            right_turn_signal,
            headlights,
            ..
        } => format!(
            "{} {} {}",
            if left_turn_signal { "◀".bright_green() } else { "·".dimmed() },
            if right_turn_signal { "▶".bright_green() } else { "·".dimmed() },
            if headlights { "HEAD".bright_yellow() } else { "head".dimmed() },
        ),
    };
    println!("  {} {:<18} {}", format!("0x{:03X}", frame.id()).bright_cyan(), name, detail);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("0x200").unwrap(), 0x200);
        assert_eq!(parse_id("512").unwrap(), 512);
        assert!(parse_id("0xZZ").is_err());
    }

    #[test]
    fn test_parse_payload_formats() {
        let spaced = parse_payload(["C2", "01", "c2", "01", "C2", "01", "C2", "01"].into_iter()).unwrap();
        let joined = parse_payload(["C201C201C201C201"].into_iter()).unwrap();
        let commas = parse_payload(["C2,01,C2,01,C2,01,C2,01"].into_iter()).unwrap();
        assert_eq!(spaced, vec![194, 1, 194, 1, 194, 1, 194, 1]);
        assert_eq!(joined, spaced);
        assert_eq!(commas, spaced);
    }
}
