//! lanchat - host or join a chat room on the local network

use anyhow::Result;
use clap::{Parser, Subcommand};
use lanchat::client::{parse_input, render_event, ParsedInput, RemoteLink, HELP_LINES};
use lanchat::config::Config;
use lanchat::event::ChatEvent;
use lanchat::logger::setup_logger;
use lanchat::server::{Room, RoomSettings};
use std::net::IpAddr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lanchat")]
#[command(about = "A peer-hosted chat room for the local network")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Display name (overrides the config file)
    #[arg(short, long)]
    name: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Host a room and relay chat for everyone who joins
    Host {
        /// Room identifier (random five-digit number by default)
        #[arg(short, long)]
        room: Option<String>,

        /// Port to listen on (0 = any free port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to listen on
        #[arg(long)]
        bind: Option<IpAddr>,
    },
    /// Join a room hosted elsewhere
    Join {
        /// Host name or IP address of the room's host
        address: String,

        /// Port the host listens on
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    setup_logger(cli.log_level.as_deref().unwrap_or(&config.general.log_level));

    let name = cli
        .name
        .clone()
        .unwrap_or_else(|| config.general.display_name.clone());

    match cli.command {
        Commands::Host { room, port, bind } => {
            let room_id = room.unwrap_or_else(generate_room_id);
            let mut settings = RoomSettings::from_config(&config.host, room_id, name);
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(bind) = bind {
                settings.bind_address = bind;
            }
            run_host(&config, settings).await
        }
        Commands::Join { address, port } => run_join(&config, &address, port, &name).await,
    }
}

/// Five-digit room number, 10000..=99999
fn generate_room_id() -> String {
    (10_000 + Uuid::new_v4().as_u128() % 90_000).to_string()
}

async fn run_host(config: &Config, settings: RoomSettings) -> Result<()> {
    let history = config.open_history()?;
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let room = Room::start(settings, history, events_tx).await?;
    tracing::info!("Hosting room {} as {}", room.id(), room.host_name());
    println!(
        "*** Room {} is open on port {}",
        room.id(),
        room.local_addr().port()
    );
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    room.terminate(false).await;
                    break;
                };
                match parse_input(&line) {
                    ParsedInput::Text(text) => {
                        if let Err(e) = room.post(&text).await {
                            println!("!!! {}", e);
                        }
                    }
                    ParsedInput::ControlCommand { command, .. } => match command.as_str() {
                        "who" => {
                            let participants = room.participants().await;
                            println!("*** {} connected", participants.len());
                            for participant in participants {
                                println!("    {} ({})", participant.name, participant.peer);
                            }
                        }
                        "leave" | "quit" => {
                            room.terminate(false).await;
                            break;
                        }
                        "terminate" => {
                            room.terminate(true).await;
                            break;
                        }
                        "help" => print_help(),
                        other => println!("*** Unknown command /{}", other),
                    },
                    ParsedInput::Empty => {}
                }
            }

            Some(event) = events.recv() => print_event(&event),

            _ = room.closed() => break,

            _ = tokio::signal::ctrl_c() => {
                room.terminate(false).await;
                break;
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    Ok(())
}

async fn run_join(config: &Config, address: &str, port: u16, name: &str) -> Result<()> {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let link = RemoteLink::connect_with_timeout(
        address,
        port,
        name,
        config.client.connect_timeout(),
        events_tx,
    )
    .await?;
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    link.disconnect();
                    break;
                };
                match parse_input(&line) {
                    ParsedInput::Text(text) => {
                        if let Err(e) = link.send_chat(&text) {
                            println!("!!! {}", e);
                        }
                    }
                    ParsedInput::ControlCommand { command, .. } => match command.as_str() {
                        "leave" | "quit" => {
                            link.disconnect();
                            break;
                        }
                        "who" | "terminate" => println!("*** Only the host can /{}", command),
                        "help" => print_help(),
                        other => println!("*** Unknown command /{}", other),
                    },
                    ParsedInput::Empty => {}
                }
            }

            Some(event) = events.recv() => print_event(&event),

            _ = link.closed() => break,

            _ = tokio::signal::ctrl_c() => {
                link.disconnect();
                break;
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    Ok(())
}

fn print_event(event: &ChatEvent) {
    println!("{}", render_event(event));
}

fn print_help() {
    for line in HELP_LINES {
        println!("{}", line);
    }
}
