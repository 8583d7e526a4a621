//! Pipeline Assembly
//!
//! sensor reader → message ring → translator scheduler → translator →
//! frame ring → uplink scheduler → server communicator

use crate::config::{GatewayConfig, SensorConfig, SensorMode};
use crate::error::GatewayError;
use awl_protocol::{
    AwlMessage, AwlTranslator, Frame, MockSensor, ReplaySensor, SensorCommunicator, SensorLink,
};
use data_scheduler::DataProcessingScheduler;
use ring_buffer::Source;
use server_link::{FramePublisher, ServerCommunicator};
use std::sync::Arc;
use tracing::{info, warn};

/// Open the sensor link selected by the configuration
pub fn open_sensor(config: &SensorConfig) -> Result<Box<dyn SensorLink>, GatewayError> {
    match config.mode {
        SensorMode::Mock => Ok(Box::new(MockSensor::new(config.mock.clone()))),
        SensorMode::Replay => {
            let path = config
                .replay_path
                .as_ref()
                .ok_or(GatewayError::MissingReplayPath)?;
            Ok(Box::new(ReplaySensor::open(path)?))
        }
    }
}

/// The assembled sensor-to-server pipeline
pub struct Gateway<P: FramePublisher + 'static> {
    sensor: SensorCommunicator,
    translator: Arc<AwlTranslator>,
    translator_scheduler: DataProcessingScheduler<AwlMessage, AwlTranslator>,
    server: Arc<ServerCommunicator<P>>,
    uplink_scheduler: DataProcessingScheduler<Frame, ServerCommunicator<P>>,
}

impl<P: FramePublisher + 'static> Gateway<P> {
    /// Build every stage and link them, downstream first
    pub fn assemble(config: &GatewayConfig, publisher: P) -> Result<Self, GatewayError> {
        config.validate()?;

        let server = Arc::new(ServerCommunicator::new(&config.server, publisher));
        let uplink_scheduler =
            DataProcessingScheduler::new(Arc::clone(&server), config.schedulers.server.clone())?;

        let translator = Arc::new(AwlTranslator::new());
        translator.link_consumer(&uplink_scheduler)?;
        let translator_scheduler = DataProcessingScheduler::new(
            Arc::clone(&translator),
            config.schedulers.translator.clone(),
        )?;

        let sensor = SensorCommunicator::new("sensor-reader");
        sensor.link_consumer(&translator_scheduler)?;

        info!("Gateway pipeline assembled");
        Ok(Self {
            sensor,
            translator,
            translator_scheduler,
            server,
            uplink_scheduler,
        })
    }

    /// Start reading from `link`
    pub fn start(&self, link: Box<dyn SensorLink>) -> Result<(), GatewayError> {
        self.sensor.start(link)?;
        Ok(())
    }

    /// Whether the sensor reader has stopped on its own
    pub fn sensor_finished(&self) -> bool {
        self.sensor.is_finished()
    }

    /// Stop the sensor and drain every stage in pipeline order
    pub fn shutdown(&self) -> Result<(), GatewayError> {
        info!("Shutting down gateway");
        let sensor_result = self.sensor.terminate_and_join();
        self.translator_scheduler.terminate_and_join()?;
        self.uplink_scheduler.terminate_and_join()?;

        let pending = self.server.flush_backlog();
        if pending > 0 {
            warn!(pending, "frames left unpublished at shutdown");
        }
        info!(
            frames = self.translator.frames_completed(),
            published = self.server.published(),
            dropped = self.server.dropped(),
            "Gateway stopped"
        );
        sensor_result?;
        Ok(())
    }

    /// The frame translator stage
    pub fn translator(&self) -> &AwlTranslator {
        &self.translator
    }

    /// The server uplink stage
    pub fn server(&self) -> &ServerCommunicator<P> {
        &self.server
    }
}
