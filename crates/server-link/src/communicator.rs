//! Frame Upload Stage

use crate::{FrameMessage, FramePublisher, ServerConfig, ServerError};
use awl_protocol::Frame;
use metrics::counter;
use ring_buffer::{BoundedQueue, Sink};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// Default number of payloads kept for retry
pub const DEFAULT_BACKLOG: usize = 64;

/// Pipeline sink publishing every frame to the server.
///
/// Payloads the publisher rejects wait in a bounded backlog and are retried,
/// oldest first, before the next frame goes out. A full backlog drops its
/// oldest payload.
pub struct ServerCommunicator<P: FramePublisher, const BACKLOG: usize = DEFAULT_BACKLOG> {
    gateway_id: String,
    topic: String,
    publisher: P,
    backlog: BoundedQueue<Vec<u8>, BACKLOG>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl<P: FramePublisher, const BACKLOG: usize> ServerCommunicator<P, BACKLOG> {
    /// Create a new server communicator
    pub fn new(config: &ServerConfig, publisher: P) -> Self {
        let topic = config.frame_topic();
        info!("Publishing frames to {}", topic);
        Self {
            gateway_id: config.gateway_id.clone(),
            topic,
            publisher,
            backlog: BoundedQueue::new(),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Topic frames are published to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The underlying transport
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Payloads delivered to the publisher
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Payloads lost to a full backlog
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Payloads waiting for retry
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Serialize and publish one frame
    pub fn publish_frame(&self, frame: Frame) -> Result<(), ServerError> {
        let frame_id = frame.frame_id;
        let payload = serde_json::to_vec(&FrameMessage::new(self.gateway_id.as_str(), frame))?;

        if self.flush_backlog() > 0 {
            debug!(frame_id, "backlog pending, frame queued");
            self.enqueue(payload);
            return Ok(());
        }

        match self.publisher.publish(&self.topic, &payload) {
            Ok(()) => self.record_published(),
            Err(e) => {
                warn!(frame_id, error = %e, "frame publish failed, queued for retry");
                self.enqueue(payload);
            }
        }
        Ok(())
    }

    /// Retry queued payloads in order until one fails; returns how many
    /// remain queued
    pub fn flush_backlog(&self) -> usize {
        while let Some(payload) = self.backlog.peek() {
            if let Err(e) = self.publisher.publish(&self.topic, &payload) {
                debug!(error = %e, pending = self.backlog.len(), "backlog retry failed");
                break;
            }
            self.backlog.consume_next().ok();
            self.record_published();
        }
        self.backlog.len()
    }

    fn enqueue(&self, payload: Vec<u8>) {
        if self.backlog.is_full() && self.backlog.consume_next().is_ok() {
            warn!(capacity = BACKLOG, "backlog full, oldest frame dropped");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            counter!("server_frames_dropped").increment(1);
        }
        if let Err(e) = self.backlog.store(payload) {
            error!(error = %e, "failed to queue frame");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            counter!("server_frames_dropped").increment(1);
        }
    }

    fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
        counter!("server_frames_published").increment(1);
    }
}

impl<P: FramePublisher, const BACKLOG: usize> Sink<Frame> for ServerCommunicator<P, BACKLOG> {
    fn consume(&self, frame: Frame) {
        if let Err(e) = self.publish_frame(frame) {
            error!(error = %e, "failed to publish frame");
        }
    }
}
