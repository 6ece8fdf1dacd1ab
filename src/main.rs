// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! SensorFlow - Real-time sensor ingestion and anomaly alerting
//!
//! Runs the pipeline headless: simulated sensors feed the store, snapshots are pushed
//! over WebSocket, and old data is swept hourly.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sensorflow::{build_info, Config, Engine, VERSION};

/// SensorFlow - Real-time sensor ingestion and anomaly alerting
#[derive(Parser, Debug)]
#[command(name = "sensorflow")]
#[command(author = "SensorFlow Project")]
#[command(version = VERSION)]
#[command(about = "Sensor ingestion, running statistics and anomaly alerts")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not start the simulated sensor fleet
    #[arg(long)]
    no_simulation: bool,

    /// WebSocket server port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Persist to a SQLite database at this path
    #[arg(long)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Override with command line args
    if args.no_simulation {
        config.simulation.enabled = false;
    }
    if let Some(port) = args.ws_port {
        config.streaming.websocket_port = port;
    }
    if let Some(path) = args.database {
        config.database.enabled = true;
        config.database.path = path;
    }
    config.validate()?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.max_log_level()?
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let build = build_info();
    info!("SensorFlow v{} ({} / {})", build.version, build.os, build.target);
    info!("Configuration loaded from {:?}", config_path);
    info!("Simulation: {}", config.simulation.enabled);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let mut engine = Engine::new(config).await?;
    engine.start().await?;

    if let Some(addr) = engine.websocket_addr().await {
        info!("Subscribers connect at ws://{}", addr);
    }
    info!("SensorFlow running, press Ctrl+C to shutdown");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    engine.stop().await?;

    let health = engine.health();
    info!(
        "Final state: {} readings retained, {} ingested, {} rejected, {} alerts raised",
        health.total_readings, health.ingested, health.rejected, health.alerts_raised
    );

    Ok(())
}
