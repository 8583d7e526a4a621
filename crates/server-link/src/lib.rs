//! Server Link Module
//!
//! Uploads completed detection frames to the backend:
//! - JSON envelopes with a unique message id and gateway identity
//! - MQTT transport with a background event loop
//! - Bounded backlog retrying failed uploads, oldest dropped first

mod communicator;
mod mqtt;

pub use communicator::{ServerCommunicator, DEFAULT_BACKLOG};
pub use mqtt::MqttPublisher;

use awl_protocol::Frame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Server link error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Server link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// MQTT broker host
    pub broker_host: String,
    /// MQTT broker port
    pub broker_port: u16,
    /// Gateway identity, part of the client id and topic
    pub gateway_id: String,
    /// Topic prefix
    pub topic_prefix: String,
    /// MQTT keep-alive (seconds)
    pub keep_alive_secs: u64,
    /// MQTT quality of service (0, 1 or 2)
    pub qos: u8,
    /// Pending client requests before publishing fails
    pub request_capacity: usize,
    /// Pause between reconnect attempts (ms)
    pub reconnect_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            gateway_id: "gateway-0".to_string(),
            topic_prefix: "sensors".to_string(),
            keep_alive_secs: 30,
            qos: 1,
            request_capacity: 64,
            reconnect_delay_ms: 2000,
        }
    }
}

impl ServerConfig {
    /// Topic frames are published to
    pub fn frame_topic(&self) -> String {
        format!("{}/{}/frames", self.topic_prefix, self.gateway_id)
    }
}

/// Envelope published for every frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMessage {
    pub message_id: Uuid,
    pub gateway_id: String,
    pub timestamp: DateTime<Utc>,
    pub frame: Frame,
}

impl FrameMessage {
    /// Wrap a frame with a fresh message id and the current time
    pub fn new(gateway_id: impl Into<String>, frame: Frame) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            gateway_id: gateway_id.into(),
            timestamp: Utc::now(),
            frame,
        }
    }
}

/// Transport that delivers serialized frames
pub trait FramePublisher: Send + Sync {
    /// Hand `payload` to the transport for delivery on `topic`
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), ServerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_topic() {
        let config = ServerConfig {
            gateway_id: "gw-7".to_string(),
            ..Default::default()
        };
        assert_eq!(config.frame_topic(), "sensors/gw-7/frames");
    }

    #[test]
    fn test_messages_get_unique_ids() {
        let a = FrameMessage::new("gw", Frame::default());
        let b = FrameMessage::new("gw", Frame::default());
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn test_envelope_json_shape() {
        let message = FrameMessage::new(
            "gw",
            Frame {
                frame_id: 3,
                system_id: 1,
                pixels: Vec::new(),
            },
        );
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["gateway_id"], "gw");
        assert_eq!(value["frame"]["frame_id"], 3);
        assert!(value["message_id"].is_string());
        assert!(value["timestamp"].is_string());
    }
}
