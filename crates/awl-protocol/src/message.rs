//! AWL Message Definitions and Payload Decoding
//!
//! Every AWL message carries up to eight payload bytes. Multi-byte fields
//! are big-endian.

use crate::error::ProtocolError;
use crate::id;
use serde::{Deserialize, Serialize};

/// Maximum payload size of a CAN message
pub const MAX_PAYLOAD: usize = 8;

/// Raw CAN message as delivered by the sensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwlMessage {
    /// CAN message identifier
    pub id: u32,
    /// Reception timestamp (Unix ms)
    pub timestamp_ms: u64,
    /// Number of valid payload bytes
    pub length: u8,
    /// Payload, zero padded
    pub data: [u8; MAX_PAYLOAD],
}

/// Detection track carried by a track message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackUpdate {
    pub track_id: u16,
    pub pixel_id: u16,
    pub confidence_level: u8,
    pub intensity: u16,
}

/// Kinematics carried by a velocity message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VelocityUpdate {
    pub track_id: u16,
    /// Distance (cm)
    pub distance: u16,
    /// Speed (cm/s)
    pub speed: i16,
    /// Acceleration (cm/s²)
    pub acceleration: i16,
}

/// Decoded message content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMessage {
    EndOfFrame { frame_id: u16, system_id: u16 },
    Track(TrackUpdate),
    Velocity(VelocityUpdate),
    /// Message id the gateway does not handle
    Unsupported(u32),
}

impl AwlMessage {
    /// Create a new message; payload bytes past [`MAX_PAYLOAD`] are ignored
    pub fn new(id: u32, timestamp_ms: u64, payload: &[u8]) -> Self {
        let length = payload.len().min(MAX_PAYLOAD);
        let mut data = [0u8; MAX_PAYLOAD];
        data[..length].copy_from_slice(&payload[..length]);
        Self {
            id,
            timestamp_ms,
            length: length as u8,
            data,
        }
    }

    /// Build an end-of-frame message
    pub fn end_of_frame(frame_id: u16, system_id: u16, timestamp_ms: u64) -> Self {
        let [f0, f1] = frame_id.to_be_bytes();
        let [s0, s1] = system_id.to_be_bytes();
        Self::new(id::END_OF_FRAME, timestamp_ms, &[f0, f1, s0, s1])
    }

    /// Build a detection track message
    pub fn track(update: TrackUpdate, timestamp_ms: u64) -> Self {
        let [t0, t1] = update.track_id.to_be_bytes();
        let [p0, p1] = update.pixel_id.to_be_bytes();
        let [i0, i1] = update.intensity.to_be_bytes();
        Self::new(
            id::DETECTION_TRACK,
            timestamp_ms,
            &[t0, t1, p0, p1, update.confidence_level, i0, i1],
        )
    }

    /// Build a detection velocity message
    pub fn velocity(update: VelocityUpdate, timestamp_ms: u64) -> Self {
        let [t0, t1] = update.track_id.to_be_bytes();
        let [d0, d1] = update.distance.to_be_bytes();
        let [s0, s1] = update.speed.to_be_bytes();
        let [a0, a1] = update.acceleration.to_be_bytes();
        Self::new(
            id::DETECTION_VELOCITY,
            timestamp_ms,
            &[t0, t1, d0, d1, s0, s1, a0, a1],
        )
    }

    /// Valid payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.length).min(MAX_PAYLOAD)]
    }

    /// Decode the payload according to the message id
    pub fn decode(&self) -> Result<SensorMessage, ProtocolError> {
        match self.id {
            id::END_OF_FRAME => {
                let p = self.require(4)?;
                Ok(SensorMessage::EndOfFrame {
                    frame_id: be_u16(p, 0),
                    system_id: be_u16(p, 2),
                })
            }
            id::DETECTION_TRACK => {
                let p = self.require(7)?;
                Ok(SensorMessage::Track(TrackUpdate {
                    track_id: be_u16(p, 0),
                    pixel_id: be_u16(p, 2),
                    confidence_level: p[4],
                    intensity: be_u16(p, 5),
                }))
            }
            id::DETECTION_VELOCITY => {
                let p = self.require(8)?;
                Ok(SensorMessage::Velocity(VelocityUpdate {
                    track_id: be_u16(p, 0),
                    distance: be_u16(p, 2),
                    speed: be_u16(p, 4) as i16,
                    acceleration: be_u16(p, 6) as i16,
                }))
            }
            other => Ok(SensorMessage::Unsupported(other)),
        }
    }

    fn require(&self, expected: usize) -> Result<&[u8], ProtocolError> {
        let payload = self.payload();
        if payload.len() < expected {
            return Err(ProtocolError::TruncatedPayload {
                id: self.id,
                expected,
                actual: payload.len(),
            });
        }
        Ok(payload)
    }
}

fn be_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}
