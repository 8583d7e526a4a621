//! Sensor Gateway - Main Entry Point

use anyhow::Context;
use clap::Parser;
use gateway::{init_logging, init_metrics, open_sensor, Gateway, GatewayConfig, SensorMode};
use server_link::MqttPublisher;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "sensor-gateway")]
#[command(about = "Forwards AWL sensor detections to the backend server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the synthetic sensor
    #[arg(long, conflicts_with = "replay")]
    mock: bool,

    /// Replay a JSON-lines capture instead of reading the sensor
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        GatewayConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if cli.mock {
        config.sensor.mode = SensorMode::Mock;
    }
    if let Some(path) = cli.replay {
        config.sensor.mode = SensorMode::Replay;
        config.sensor.replay_path = Some(path);
    }

    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    info!("=== Sensor Gateway v{} ===", env!("CARGO_PKG_VERSION"));

    let publisher = MqttPublisher::connect(&config.server).context("failed to start MQTT client")?;
    let gateway = Gateway::assemble(&config, publisher).context("failed to assemble pipeline")?;
    let link = open_sensor(&config.sensor).context("failed to open sensor")?;

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .context("failed to install Ctrl+C handler")?;

    gateway.start(link)?;
    info!("Gateway running, press Ctrl+C to stop");

    while running.load(Ordering::SeqCst) && !gateway.sensor_finished() {
        thread::sleep(Duration::from_millis(100));
    }

    gateway.shutdown()?;
    gateway.server().publisher().disconnect();
    Ok(())
}
