//! MQTT Transport

use crate::{FramePublisher, ServerConfig, ServerError};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// [`FramePublisher`] over the blocking `rumqttc` client.
///
/// The connection is driven by a background thread which also reconnects
/// after broker failures. Publishing never blocks: when the client's request
/// queue is full the publish fails and the frame goes to the backlog.
pub struct MqttPublisher {
    client: Client,
    qos: QoS,
    stop: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// Create the client and start its event loop thread
    pub fn connect(config: &ServerConfig) -> Result<Self, ServerError> {
        let mut options = MqttOptions::new(
            format!("gateway-{}", config.gateway_id),
            config.broker_host.as_str(),
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

        let (client, mut connection) = Client::new(options, config.request_capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let reconnect_delay = Duration::from_millis(config.reconnect_delay_ms);

        let thread_stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("mqtt-events".to_string())
            .spawn(move || {
                for notification in connection.iter() {
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("Connected to MQTT broker");
                        }
                        Ok(Event::Incoming(incoming)) => {
                            debug!("MQTT incoming: {:?}", incoming);
                        }
                        Ok(Event::Outgoing(_)) => {}
                        Err(e) => {
                            error!("MQTT error: {}", e);
                            thread::sleep(reconnect_delay);
                        }
                    }
                }
                debug!("MQTT event loop stopped");
            })
            .map_err(|e| ServerError::Connection(e.to_string()))?;

        info!(
            "MQTT client started for {}:{}",
            config.broker_host, config.broker_port
        );
        Ok(Self {
            client,
            qos: qos_level(config.qos),
            stop,
        })
    }

    /// Stop the event loop and send a disconnect to the broker
    pub fn disconnect(&self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.client.try_disconnect() {
            debug!("MQTT disconnect not sent: {}", e);
        }
        info!("MQTT client disconnected");
    }
}

impl FramePublisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), ServerError> {
        self.client
            .try_publish(topic, self.qos, false, payload.to_vec())
            .map_err(|e| ServerError::Publish(e.to_string()))
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn qos_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
