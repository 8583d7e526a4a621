//! AWL Sensor Protocol Implementation
//!
//! This crate turns the raw CAN messages of an AWL detection sensor into
//! complete detection frames. It provides the message decoder, the frame
//! assembling translator stage and the threaded sensor reader that feeds
//! the pipeline.

mod error;
mod frame;
mod message;
mod sensor;
mod translator;

pub use error::ProtocolError;
pub use frame::{Frame, Pixel, Track};
pub use message::{AwlMessage, SensorMessage, TrackUpdate, VelocityUpdate, MAX_PAYLOAD};
pub use sensor::{MockSensor, MockSensorConfig, ReplaySensor, SensorCommunicator, SensorLink};
pub use translator::AwlTranslator;

/// AWL CAN message identifiers
pub mod id {
    /// Closes the frame in progress
    pub const END_OF_FRAME: u32 = 9;
    /// Detection track for one pixel
    pub const DETECTION_TRACK: u32 = 10;
    /// Kinematics of a previously reported track
    pub const DETECTION_VELOCITY: u32 = 11;
}
