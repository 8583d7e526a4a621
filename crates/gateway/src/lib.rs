//! Sensor Gateway
//!
//! Reads AWL detection messages from the sensor, assembles them into
//! frames and uploads the frames to the backend server.

mod config;
mod error;
mod pipeline;

pub use config::{
    GatewayConfig, LoggingConfig, MetricsConfig, SchedulersConfig, SensorConfig, SensorMode,
};
pub use error::GatewayError;
pub use pipeline::{open_sensor, Gateway};

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), GatewayError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| GatewayError::Logging(format!("unknown log level '{}'", config.level)))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.map_err(|e| GatewayError::Logging(e.to_string()))
}

/// Start the Prometheus scrape endpoint if enabled
pub fn init_metrics(config: &MetricsConfig) -> Result<(), GatewayError> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| GatewayError::Metrics(format!("invalid listen address '{}': {}", config.listen, e)))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| GatewayError::Metrics(e.to_string()))?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
