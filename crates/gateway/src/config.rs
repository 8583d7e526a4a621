//! Gateway Configuration
//!
//! Settings come from an optional TOML file, overridden by `GATEWAY__*`
//! environment variables (`GATEWAY__SERVER__BROKER_PORT=1884`).

use crate::error::GatewayError;
use awl_protocol::MockSensorConfig;
use config::{Config, Environment, File};
use data_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use server_link::ServerConfig;
use std::path::{Path, PathBuf};

/// Where sensor messages come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorMode {
    /// Synthetic message cycle
    Mock,
    /// JSON-lines capture file
    Replay,
}

/// Sensor reader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub mode: SensorMode,
    /// Capture file for replay mode
    pub replay_path: Option<PathBuf>,
    pub mock: MockSensorConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            mode: SensorMode::Mock,
            replay_path: None,
            mock: MockSensorConfig::default(),
        }
    }
}

/// Worker settings for both pipeline schedulers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulersConfig {
    /// Drains sensor messages into the translator
    pub translator: SchedulerConfig,
    /// Drains frames into the server uplink
    pub server: SchedulerConfig,
}

impl Default for SchedulersConfig {
    fn default() -> Self {
        Self {
            translator: SchedulerConfig::named("translator"),
            server: SchedulerConfig::named("server-uplink"),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Scrape endpoint address
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9000".to_string(),
        }
    }
}

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub sensor: SensorConfig,
    pub schedulers: SchedulersConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl GatewayConfig {
    /// Load settings from `path` (if any) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, GatewayError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Check settings that serde cannot express
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.sensor.mode == SensorMode::Replay && self.sensor.replay_path.is_none() {
            return Err(GatewayError::MissingReplayPath);
        }
        Ok(())
    }
}
