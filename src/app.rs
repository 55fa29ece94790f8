use std::path::PathBuf;
use clap::{Parser, Subcommand};
use futures::channel::mpsc::{unbounded, Sender, UnboundedReceiver};
use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::btle::BtlePlatform;
use crate::device::connection::session_task;
use crate::device::controller::VacuumController;
use crate::device::session::Session;
use crate::device::types::{SessionCommand, SessionEvent, VacuumCommand};
use crate::error::AppRunError;
use crate::init_logging;

#[derive(Parser, Debug)]
#[command(version, about = "Controls a BLE vacuum from the command line")]
pub struct Cli {
    /// Use this config file instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// List vacuums advertising the control service
    Scan,
    /// Connect to a vacuum and send commands typed on stdin (on, off, up, down, status, quit)
    Connect {
        address: String,
    },
}

async fn load_config(config_io: &ConfigIO) -> (Config, Option<String>) {
    match config_io.read().await {
        Ok(config) => (config, None),
        Err(err) => {
            if err.is_file_not_found_error() {
                (Config::default(), None)
            } else {
                (Config::default(), Some(format!("Failed to load config: {}", &err)))
            }
        },
    }
}

fn parse_command(line: &str) -> Option<VacuumCommand> {
    match line.trim().to_lowercase().as_str() {
        "on" | "1" => Some(VacuumCommand::PowerOn),
        "off" | "0" => Some(VacuumCommand::PowerOff),
        "up" | "+" => Some(VacuumCommand::LevelUp),
        "down" | "-" => Some(VacuumCommand::LevelDown),
        "status" => Some(VacuumCommand::Status),
        _ => None,
    }
}

fn print_state(controller: &VacuumController) {
    let state = controller.vacuum_state();
    if state.on {
        println!(
            "{} | livello {} | potenza {} W | sensore {}",
            state.status_text(),
            state.level,
            state.power_watts,
            state.sensor_text(),
        );
    } else {
        println!("{}", state.status_text());
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn submit(commands: &mut Sender<SessionCommand>, command: SessionCommand) -> Result<(), AppRunError> {
    commands.send(command).await.map_err(|err| {
        warn!("Session task is gone, dropping command: {:?}", err);
        AppRunError::SessionStopped
    })
}

async fn scan(
    controller: &mut VacuumController,
    commands: &mut Sender<SessionCommand>,
    events: &mut UnboundedReceiver<SessionEvent>,
) -> Result<(), AppRunError> {
    submit(commands, controller.start_scan()).await?;

    while let Some(event) = events.next().await {
        let changed = controller.handle_event(&event, Instant::now());

        match event {
            SessionEvent::DeviceFound(peripheral) if changed => {
                println!("{}  {}", peripheral.address, controller.registry().display_name(&peripheral));
            },
            SessionEvent::ScanComplete => break,
            SessionEvent::ScanError(err) => {
                eprintln!("{}", err);
                break;
            },
            _ => {},
        }
    }

    info!("Found {} device(s)", controller.registry().len());
    Ok(())
}

async fn control(
    address: &str,
    controller: &mut VacuumController,
    commands: &mut Sender<SessionCommand>,
    events: &mut UnboundedReceiver<SessionEvent>,
) -> Result<(), AppRunError> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut connecting = false;
    let mut stdin_open = true;

    submit(commands, controller.start_scan()).await?;

    'mainloop: loop {
        tokio::select! {
            event = events.next() => {
                let event = match event {
                    Some(event) => event,
                    None => break 'mainloop,
                };
                controller.handle_event(&event, Instant::now());

                match event {
                    SessionEvent::DeviceFound(peripheral) if !connecting && peripheral.address.eq_ignore_ascii_case(address) => {
                        connecting = true;
                        submit(commands, SessionCommand::Connect(peripheral)).await?;
                    },
                    SessionEvent::ScanComplete if !connecting => {
                        return Err(AppRunError::PeripheralNotFound(address.to_string()));
                    },
                    SessionEvent::ScanError(err) => {
                        eprintln!("{}", err);
                        break 'mainloop;
                    },
                    SessionEvent::ConnectionError(err) => eprintln!("{}", err),
                    SessionEvent::Connected => println!("Connesso"),
                    SessionEvent::DataReceived { .. } => print_state(controller),
                    SessionEvent::Disconnected => {
                        println!("{}", controller.last_message().unwrap_or("Disconnesso"));
                        break 'mainloop;
                    },
                    _ => {},
                }
            },
            line = stdin.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        if !connecting {
                            break 'mainloop;
                        }
                        stdin_open = false;
                        submit(commands, SessionCommand::Disconnect).await?;
                        continue 'mainloop;
                    },
                    Err(err) => return Err(err.into()),
                };

                if line.trim().eq_ignore_ascii_case("quit") {
                    if !connecting {
                        break 'mainloop;
                    }
                    submit(commands, SessionCommand::Disconnect).await?;
                    stdin_open = false;
                    continue 'mainloop;
                }

                match parse_command(&line) {
                    None => eprintln!("Unknown command {:?}; use on, off, up, down, status or quit", line.trim()),
                    Some(command) => match controller.request(command) {
                        Ok(command) => {
                            submit(commands, command).await?;
                        },
                        Err(err) => eprintln!("{}", err),
                    },
                }
            },
            _ = sleep_until_deadline(controller.next_deadline()) => {
                for command in controller.fire_due_timers(Instant::now()) {
                    submit(commands, command).await?;
                }
            },
        }
    }

    Ok(())
}

pub async fn run(cli: Cli) -> Result<(), AppRunError> {
    let config_io = match cli.config {
        Some(path) => ConfigIO::open(path)?,
        None => ConfigIO::new_sync()?,
    };

    // obtain an exclusive file lock so that only one instance drives the radio
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let (config, config_error) = load_config(&config_io).await;
    init_logging(config.level_filter());
    info!(concat!("Vacuum Controller ", env!("CARGO_PKG_VERSION")));

    match config_error {
        Some(message) => error!("{}", message),
        None => {
            // write the defaults out once so that they can be edited
            if let Err(err) = config_io.save(&config).await {
                warn!("Failed to save config: {:?}", err);
            }
        },
    }

    let (platform, capabilities, platform_events) = BtlePlatform::new().await?;
    let (event_sender, mut events) = unbounded();
    let session = Session::new(platform, capabilities, event_sender, config.session_options());

    let cancel = CancellationToken::new();
    let (mut commands, handle) = session_task(cancel.clone(), session, platform_events);
    let mut controller = VacuumController::new(config.controller_options());

    let result = match &cli.command {
        CliCommand::Scan => scan(&mut controller, &mut commands, &mut events).await,
        CliCommand::Connect { address } => control(address, &mut controller, &mut commands, &mut events).await,
    };

    cancel.cancel();
    if let Err(err) = handle.await {
        error!("Session task failed: {:?}", err);
    }

    result
}
