//! Wicket CLI
//!
//! A command-line client for the wicket tunnel.

mod provider;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wicket_engine::{protector_for, ChannelEventHandler, Config, Supervisor, VpnEvent};
use wicket_protocol::InterfaceParameters;

use crate::provider::HostInterfaceProvider;

/// Wicket - client for a lightweight UDP tunnel
#[derive(Parser)]
#[command(name = "wicket")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wicket.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the gateway and relay traffic until interrupted
    Connect {
        /// Name for the TUN device (chosen by the OS if omitted)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Generate a sample configuration file
    GenConfig {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "wicket.toml")]
        output: PathBuf,
    },

    /// Validate an interface parameter string and print its canonical form
    ParseParams {
        /// Parameter string, e.g. "m,1400 a,10.0.0.2,24 r,0.0.0.0,0"
        params: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Connect { interface } => run_connect(&cli.config, interface).await,
        Commands::GenConfig { output } => generate_config(output),
        Commands::ParseParams { params } => parse_params(&params),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_connect(config_path: &Path, interface: Option<String>) -> Result<()> {
    info!("Starting wicket client...");

    let config = load_config(config_path)?;
    info!("Configuration loaded from {:?}", config_path);

    let protector = protector_for(&config.socket).context("Failed to set up socket protection")?;
    let (events, mut rx) = ChannelEventHandler::channel();

    let supervisor = Supervisor::builder(Arc::new(HostInterfaceProvider::new(interface)))
        .protector(protector)
        .event_handler(Arc::new(events))
        .build();

    supervisor
        .connect(config)
        .await
        .context("Failed to start connection")?;

    let result = tokio::select! {
        signal = wait_for_shutdown() => signal,
        reason = watch_events(&mut rx) => Err(anyhow::anyhow!("Connection ended: {}", reason)),
    };

    info!("Shutting down client...");
    supervisor.shutdown().await;

    // Drain what the shutdown emitted
    while let Ok(event) = rx.try_recv() {
        log_event(&event);
    }

    result
}

/// Log events until the tunnel ends on its own, returning the reason
async fn watch_events(rx: &mut mpsc::UnboundedReceiver<VpnEvent>) -> String {
    while let Some(event) = rx.recv().await {
        log_event(&event);
        if let VpnEvent::Disconnected { reason } = event {
            return reason;
        }
    }
    "event channel closed".to_string()
}

fn log_event(event: &VpnEvent) {
    match event {
        VpnEvent::Connecting { id, server } => info!("[conn {}] Connecting to {}", id, server),
        VpnEvent::Connected { id, interface } => info!("[conn {}] Connected via {}", id, interface),
        VpnEvent::Disconnected { reason } => warn!("Disconnected: {}", reason),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load configuration from {:?}", path))
}

fn generate_config(output: PathBuf) -> Result<()> {
    let sample = Config::sample();

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write configuration to {:?}", output))?;

    info!("Generated sample configuration at {:?}", output);
    println!("Sample configuration written to {:?}", output);
    println!("\nEdit the configuration file and set the gateway and shared secret before connecting.");

    Ok(())
}

fn parse_params(raw: &str) -> Result<()> {
    let params = match raw.parse::<InterfaceParameters>() {
        Ok(params) => params,
        Err(e) => {
            error!("Invalid parameter string: {}", e);
            bail!("invalid parameter string: {}", e);
        }
    };

    println!("{}", params);
    if params.ipv4_address().is_none() && params.ipv6_addresses().next().is_none() {
        warn!("No interface address in parameter string");
    }
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to register SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("Failed to register SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
