//! AWL Protocol Error Types

use ring_buffer::FlowError;
use thiserror::Error;

/// Errors that can occur while reading and decoding sensor data
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// I/O error on the sensor link or capture file
    #[error("Sensor I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload shorter than the message layout requires
    #[error("Truncated payload for message {id}: expected {expected} bytes, got {actual}")]
    TruncatedPayload { id: u32, expected: usize, actual: usize },

    /// The sensor has no more messages to deliver
    #[error("Sensor disconnected")]
    Disconnected,

    /// Capture line that is not a valid message record
    #[error("Invalid capture record on line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    /// Reader thread started twice
    #[error("Sensor reader already started")]
    AlreadyStarted,

    /// Reader thread ended by panicking
    #[error("Sensor reader thread panicked")]
    ReaderPanicked,

    /// Data-flow contract violation
    #[error(transparent)]
    Flow(#[from] FlowError),
}
