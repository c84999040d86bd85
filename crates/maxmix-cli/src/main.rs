//! MaxMix CLI - host side of the MaxMix audio mixer remote
//!
//! Find the device on a serial port, probe its firmware, and keep it in
//! sync with a host mixer.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use maxmix_audio::{AudioMirror, Mixer};
use maxmix_client::{MaxMix, ServiceEvent};
use maxmix_core::Registry;
use maxmix_transport::{Discovery, PortProvider, ProbeOutcome, SerialPortProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::Config;

/// MaxMix - serial audio mixer remote
#[derive(Parser)]
#[command(name = "maxmix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "MAXMIX_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one handshake against a port, or against every port
    Probe {
        /// Port name (e.g. COM3, /dev/ttyUSB0)
        port: Option<String>,
    },

    /// Connect to the device and mirror the host described in the config
    Run,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let config_path = cli.config.clone().unwrap_or_else(config::default_path);
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Ports { json } => list_ports(json).await?,
        Commands::Probe { port } => probe(&config, port.as_deref()).await?,
        Commands::Run => run(&config).await?,
        Commands::Config => {
            println!("# {}", config_path.display());
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

async fn list_ports(json: bool) -> Result<()> {
    let ports = SerialPortProvider::new()
        .available_ports()
        .await
        .context("Failed to list serial ports")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
    }
    for port in ports {
        println!("  {}", port);
    }
    Ok(())
}

async fn probe(config: &Config, port: Option<&str>) -> Result<()> {
    let discovery = Discovery::new(
        Arc::new(SerialPortProvider::new()),
        Arc::new(Registry::with_defaults()),
        config.transport_config(),
    );

    let results = match port {
        Some(name) => vec![(name.to_string(), discovery.probe(name).await)],
        None => discovery.sweep().await.context("Failed to list serial ports")?,
    };

    if results.is_empty() {
        println!("{}", "No serial ports found".yellow());
    }
    for (name, outcome) in results {
        match outcome {
            Ok(ProbeOutcome::Compatible { revision, .. }) => println!(
                "{} {} firmware revision {}",
                "OK".green().bold(),
                name,
                revision
            ),
            Ok(ProbeOutcome::Incompatible { revision }) => println!(
                "{} {} incompatible firmware revision {}",
                "INCOMPATIBLE".red().bold(),
                name,
                revision
            ),
            Ok(ProbeOutcome::NoResponse) => {
                println!("{} {} no response", "--".dimmed(), name)
            }
            Err(e) => println!("{} {} {}", "ERROR".red(), name, e),
        }
    }
    Ok(())
}

async fn run(config: &Config) -> Result<()> {
    let host = config.simulated_host()?;
    let (mirror, mirror_events) =
        AudioMirror::start(Arc::new(host)).context("Failed to start audio mirror")?;

    println!(
        "{} Mirroring {} items, searching for device",
        "MAXMIX".cyan().bold(),
        mirror.items().len()
    );

    let (service, mut events) = MaxMix::builder()
        .transport(config.transport_config())
        .settings(config.device.clone())
        .queue_capacity(config.queue_capacity)
        .start(
            Arc::new(SerialPortProvider::new()),
            mirror.clone(),
            mirror_events,
        );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ServiceEvent::Discovered { port }) => {
                    println!("{} Device found on {}", "MAXMIX".cyan().bold(), port);
                }
                Some(ServiceEvent::Connected { port }) => {
                    println!("{} Connected on {}", "OK".green().bold(), port);
                }
                Some(ServiceEvent::Disconnected { port }) => {
                    println!("{} Disconnected from {}", "MAXMIX".yellow().bold(), port);
                }
                Some(ServiceEvent::FirmwareIncompatible { port, revision }) => {
                    println!(
                        "{} Device on {} runs firmware revision {}, skipping",
                        "INCOMPATIBLE".red().bold(),
                        port,
                        revision
                    );
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    service.shutdown().await;
    mirror.shutdown();

    let stats = service.stats();
    println!(
        "{} {} frames written, {} read, {} errors",
        "MAXMIX".cyan().bold(),
        stats.writes,
        stats.reads,
        stats.errors
    );
    Ok(())
}
