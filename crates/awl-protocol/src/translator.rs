//! AWL Message to Frame Translator
//!
//! Accumulates track and velocity messages into the frame in progress and
//! publishes it on every end-of-frame message.

use crate::frame::{Frame, Track};
use crate::message::{AwlMessage, SensorMessage, TrackUpdate, VelocityUpdate};
use metrics::counter;
use parking_lot::Mutex;
use ring_buffer::{
    BufferId, ConsumerLink, FlowError, RingSource, Sink, Source, DEFAULT_CAPACITY,
    DEFAULT_MAX_CONSUMERS,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

/// Pipeline stage turning [`AwlMessage`]s into [`Frame`]s
pub struct AwlTranslator<const N: usize = DEFAULT_CAPACITY, const C: usize = DEFAULT_MAX_CONSUMERS> {
    current: Mutex<Frame>,
    output: RingSource<Frame, N, C>,
    frames_completed: AtomicU64,
    messages_dropped: AtomicU64,
}

impl<const N: usize, const C: usize> AwlTranslator<N, C> {
    /// Create a new translator with an empty frame in progress
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Frame::default()),
            output: RingSource::new(),
            frames_completed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Identity of the frame output buffer
    pub fn output_id(&self) -> BufferId {
        self.output.buffer_id()
    }

    /// Frames published so far
    pub fn frames_completed(&self) -> u64 {
        self.frames_completed.load(Ordering::Relaxed)
    }

    /// Messages that could not be applied
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Tracks accumulated in the frame in progress
    pub fn pending_tracks(&self) -> usize {
        self.current.lock().track_count()
    }

    fn apply_track(&self, update: TrackUpdate) {
        let track = Track {
            id: update.track_id,
            confidence_level: update.confidence_level,
            intensity: update.intensity,
            ..Default::default()
        };
        self.current.lock().upsert_track(update.pixel_id, track);
    }

    fn apply_velocity(&self, update: VelocityUpdate) {
        let applied = match self.current.lock().track_mut(update.track_id) {
            Some(track) => {
                track.distance = update.distance;
                track.speed = update.speed;
                track.acceleration = update.acceleration;
                true
            }
            None => false,
        };
        if !applied {
            warn!(track_id = update.track_id, "velocity for unknown track dropped");
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn complete_frame(&self, frame_id: u16, system_id: u16) -> Result<(), FlowError> {
        let mut frame = std::mem::take(&mut *self.current.lock());
        frame.frame_id = frame_id;
        frame.system_id = system_id;
        debug!(frame_id, system_id, tracks = frame.track_count(), "frame completed");

        self.output.produce(frame)?;
        self.frames_completed.fetch_add(1, Ordering::Relaxed);
        counter!("translator_frames_completed").increment(1);
        Ok(())
    }
}

impl<const N: usize, const C: usize> Default for AwlTranslator<N, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const C: usize> Sink<AwlMessage> for AwlTranslator<N, C> {
    fn consume(&self, message: AwlMessage) {
        let decoded = match message.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(id = message.id, error = %e, "undecodable message dropped");
                self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        match decoded {
            SensorMessage::Track(update) => self.apply_track(update),
            SensorMessage::Velocity(update) => self.apply_velocity(update),
            SensorMessage::EndOfFrame {
                frame_id,
                system_id,
            } => {
                if let Err(e) = self.complete_frame(frame_id, system_id) {
                    error!(frame_id, error = %e, "failed to publish frame");
                }
            }
            SensorMessage::Unsupported(id) => {
                debug!(id, "unsupported message ignored");
            }
        }
    }
}

impl<const N: usize, const C: usize> Source<Frame> for AwlTranslator<N, C> {
    fn produce(&self, item: Frame) -> Result<(), FlowError> {
        self.output.produce(item)
    }

    fn link_consumer(&self, consumer: &dyn ConsumerLink<Frame>) -> Result<(), FlowError> {
        self.output.link_consumer(consumer)
    }
}
