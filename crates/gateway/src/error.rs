//! Gateway Error Types

use awl_protocol::ProtocolError;
use ring_buffer::FlowError;
use server_link::ServerError;
use thiserror::Error;

/// Errors raised while assembling or running the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Replay mode requires a capture file path")]
    MissingReplayPath,

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics exporter setup failed: {0}")]
    Metrics(String),

    #[error("Pipeline error: {0}")]
    Flow(#[from] FlowError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] ProtocolError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}
