//! Sensor Readers
//!
//! [`SensorLink`] abstracts where AWL messages come from. The
//! [`SensorCommunicator`] runs a link on its own thread and publishes every
//! message it reads into its output ring.

use crate::error::ProtocolError;
use crate::message::{AwlMessage, TrackUpdate, VelocityUpdate};
use parking_lot::Mutex;
use ring_buffer::{
    BufferId, ConsumerLink, FlowError, RingSource, Source, DEFAULT_CAPACITY, DEFAULT_MAX_CONSUMERS,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Connection to a source of AWL messages
pub trait SensorLink: Send {
    /// Open the connection
    fn connect(&mut self) -> Result<(), ProtocolError>;

    /// Block until the next message is available.
    ///
    /// Returns [`ProtocolError::Disconnected`] once no more messages will
    /// arrive.
    fn read_message(&mut self) -> Result<AwlMessage, ProtocolError>;

    /// Close the connection
    fn disconnect(&mut self);
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Configuration for the synthetic sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSensorConfig {
    /// Delay before each message (ms)
    pub interval_ms: u64,
    /// Tracks reported per frame
    pub tracks_per_frame: u16,
    /// System id stamped on every frame
    pub system_id: u16,
    /// Disconnect after this many frames
    pub max_frames: Option<u32>,
}

impl Default for MockSensorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10,
            tracks_per_frame: 4,
            system_id: 1,
            max_frames: None,
        }
    }
}

/// Synthetic sensor emitting a deterministic track, velocity and
/// end-of-frame cycle
pub struct MockSensor {
    config: MockSensorConfig,
    connected: bool,
    frame_id: u16,
    step: u32,
    frames_sent: u32,
}

impl MockSensor {
    /// Create a new mock sensor
    pub fn new(config: MockSensorConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_id: 0,
            step: 0,
            frames_sent: 0,
        }
    }

    fn next_message(&mut self) -> AwlMessage {
        let timestamp_ms = now_ms();
        let tracks = u32::from(self.config.tracks_per_frame);

        if self.step >= tracks * 2 {
            let message = AwlMessage::end_of_frame(self.frame_id, self.config.system_id, timestamp_ms);
            self.frame_id = self.frame_id.wrapping_add(1);
            self.frames_sent += 1;
            self.step = 0;
            return message;
        }

        let track_id = (self.step / 2) as u16;
        let phase = self.frame_id.wrapping_add(track_id);
        let message = if self.step % 2 == 0 {
            AwlMessage::track(
                TrackUpdate {
                    track_id,
                    pixel_id: track_id * 2,
                    confidence_level: 50 + (phase % 50) as u8,
                    intensity: 1000 + track_id * 10,
                },
                timestamp_ms,
            )
        } else {
            AwlMessage::velocity(
                VelocityUpdate {
                    track_id,
                    distance: 500 + (phase % 1000) * 10,
                    speed: (phase % 200) as i16 - 100,
                    acceleration: (phase % 20) as i16 - 10,
                },
                timestamp_ms,
            )
        };
        self.step += 1;
        message
    }
}

impl SensorLink for MockSensor {
    fn connect(&mut self) -> Result<(), ProtocolError> {
        info!("Mock sensor connected");
        self.connected = true;
        Ok(())
    }

    fn read_message(&mut self) -> Result<AwlMessage, ProtocolError> {
        if !self.connected {
            return Err(ProtocolError::Disconnected);
        }
        if let Some(max) = self.config.max_frames {
            if self.frames_sent >= max {
                return Err(ProtocolError::Disconnected);
            }
        }
        if self.config.interval_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.interval_ms));
        }
        Ok(self.next_message())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

/// Sensor replaying recorded messages
pub struct ReplaySensor {
    messages: VecDeque<AwlMessage>,
}

impl ReplaySensor {
    /// Replay messages held in memory
    pub fn from_messages(messages: impl IntoIterator<Item = AwlMessage>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
        }
    }

    /// Parse a JSON-lines capture, one message per line; blank lines are
    /// skipped
    pub fn from_reader(reader: impl BufRead) -> Result<Self, ProtocolError> {
        let mut messages = VecDeque::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let message = serde_json::from_str(&line).map_err(|e| ProtocolError::InvalidRecord {
                line: index + 1,
                reason: e.to_string(),
            })?;
            messages.push_back(message);
        }
        Ok(Self { messages })
    }

    /// Load a JSON-lines capture file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let sensor = Self::from_reader(BufReader::new(File::open(path)?))?;
        info!("Loaded {} messages from {}", sensor.remaining(), path.display());
        Ok(sensor)
    }

    /// Messages not yet delivered
    pub fn remaining(&self) -> usize {
        self.messages.len()
    }
}

impl SensorLink for ReplaySensor {
    fn connect(&mut self) -> Result<(), ProtocolError> {
        debug!(messages = self.messages.len(), "Replay sensor connected");
        Ok(())
    }

    fn read_message(&mut self) -> Result<AwlMessage, ProtocolError> {
        self.messages.pop_front().ok_or(ProtocolError::Disconnected)
    }

    fn disconnect(&mut self) {
        self.messages.clear();
    }
}

/// Threaded reader publishing sensor messages into the pipeline
pub struct SensorCommunicator<const N: usize = DEFAULT_CAPACITY, const C: usize = DEFAULT_MAX_CONSUMERS> {
    name: String,
    output: RingSource<AwlMessage, N, C>,
    terminate: Arc<AtomicBool>,
    started: AtomicBool,
    /// Reader thread stack size; platform default when unset
    stack_size: Option<usize>,
    reader: Mutex<Option<JoinHandle<Result<(), ProtocolError>>>>,
}

impl<const N: usize, const C: usize> SensorCommunicator<N, C> {
    /// Create a new communicator; the reader thread is named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: RingSource::new(),
            terminate: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            stack_size: None,
            reader: Mutex::new(None),
        }
    }

    /// Give the reader thread a stack of `bytes`
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Identity of the message output buffer
    pub fn output_id(&self) -> BufferId {
        self.output.buffer_id()
    }

    /// Start reading from `link` on a dedicated thread.
    ///
    /// If the thread cannot be spawned the communicator stays unstarted and
    /// `start` may be retried.
    pub fn start(&self, mut link: Box<dyn SensorLink>) -> Result<(), ProtocolError> {
        let mut reader = self.reader.lock();
        if self.started.load(Ordering::Acquire) || reader.is_some() {
            return Err(ProtocolError::AlreadyStarted);
        }

        let output = self.output.clone();
        let terminate = Arc::clone(&self.terminate);
        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        let handle = builder
            .spawn(move || {
                let result = read_loop(link.as_mut(), &output, &terminate);
                link.disconnect();
                if let Err(e) = &result {
                    error!(error = %e, "sensor reader failed");
                }
                result
            })?;

        *reader = Some(handle);
        self.started.store(true, Ordering::Release);
        info!(sensor = %self.name, "sensor reader started");
        Ok(())
    }

    /// Wait for the reader to finish on its own
    pub fn join(&self) -> Result<(), ProtocolError> {
        let Some(handle) = self.reader.lock().take() else {
            return Ok(());
        };
        let result = handle.join().unwrap_or(Err(ProtocolError::ReaderPanicked));
        info!(sensor = %self.name, "sensor reader joined");
        result
    }

    /// Whether the reader has stopped; false before [`start`](Self::start)
    pub fn is_finished(&self) -> bool {
        match self.reader.lock().as_ref() {
            Some(handle) => handle.is_finished(),
            None => self.started.load(Ordering::Acquire),
        }
    }

    /// Stop the reader and wait for it; safe to call repeatedly
    pub fn terminate_and_join(&self) -> Result<(), ProtocolError> {
        self.terminate.store(true, Ordering::Release);
        self.join()
    }
}

fn read_loop<const N: usize, const C: usize>(
    link: &mut dyn SensorLink,
    output: &RingSource<AwlMessage, N, C>,
    terminate: &AtomicBool,
) -> Result<(), ProtocolError> {
    link.connect()?;
    while !terminate.load(Ordering::Acquire) {
        match link.read_message() {
            Ok(message) => output.produce(message)?,
            Err(ProtocolError::Disconnected) => {
                info!("sensor disconnected");
                break;
            }
            Err(e @ ProtocolError::TruncatedPayload { .. }) => {
                warn!(error = %e, "malformed sensor message skipped");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

impl<const N: usize, const C: usize> Source<AwlMessage> for SensorCommunicator<N, C> {
    fn produce(&self, item: AwlMessage) -> Result<(), FlowError> {
        self.output.produce(item)
    }

    fn link_consumer(&self, consumer: &dyn ConsumerLink<AwlMessage>) -> Result<(), FlowError> {
        self.output.link_consumer(consumer)
    }
}

impl<const N: usize, const C: usize> Drop for SensorCommunicator<N, C> {
    fn drop(&mut self) {
        if let Err(e) = self.terminate_and_join() {
            error!(sensor = %self.name, error = %e, "sensor reader stopped with error");
        }
    }
}
