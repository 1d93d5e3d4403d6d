//! Curling match server binary.
//!
//! # Usage
//!
//! ```bash
//! curling-server config/server.example.json
//! curling-server config/server.example.json --port0 20000 --port1 20001 --log-level debug
//! ```
//!
//! Plays one match and exits. The exit status is non-zero when the match
//! was aborted.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use curling::{Server, ServerConfig, SimulatorRegistry, SimulatorSetting, VERSION};

/// Digital curling match server
#[derive(Parser, Debug)]
#[command(name = "curling-server")]
#[command(about = "Runs one curling match between two agent programs")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file
    config: PathBuf,

    /// Override the listening port of client 0
    #[arg(long)]
    port0: Option<u16>,

    /// Override the listening port of client 1
    #[arg(long)]
    port1: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    info!("Curling server v{}", VERSION);

    let mut config = ServerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(port) = args.port0 {
        config.port[0] = port;
    }
    if let Some(port) = args.port1 {
        config.port[1] = port;
    }
    config.validate().context("invalid port override")?;

    let registry = SimulatorRegistry::builtin();
    debug!("Simulators: {}", registry.type_names().collect::<Vec<_>>().join(", "));
    let simulator_setting = config.simulator(&registry)?;
    info!("Simulator: {}", simulator_setting.type_name());

    let server = Server::bind(config, simulator_setting).await?;
    let [addr0, addr1] = server.local_addrs()?;
    info!("Game {}: client 0 on {}, client 1 on {}", server.game_id(), addr0, addr1);

    let result = server.run().await?;
    info!("Winner: {:?} ({:?})", result.win, result.reason);

    Ok(())
}
