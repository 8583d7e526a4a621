//! Consumer Link Protocol and Pipeline Stage Interfaces
//!
//! A buffer tells its consumers when they have unread data
//! ([`ConsumerLink::activate_for`]) and when they have caught up
//! ([`ConsumerLink::deactivate_for`]). Pipeline stages are composed from
//! [`Source`]s, which write into an owned buffer, and [`Sink`]s, which
//! receive items from a consumer's worker thread.

use crate::FlowError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONSUMER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Process-unique identity of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        Self(NEXT_CONSUMER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer#{}", self.0)
    }
}

/// Buffer side of the link protocol.
///
/// Object safe so that one consumer can drain buffers of different
/// capacities.
pub trait DataBuffer<T>: Send + Sync {
    /// Identity used in notifications
    fn id(&self) -> BufferId;

    /// Overwrite the next pad with `item` and notify linked consumers
    fn write(&self, item: T) -> Result<(), FlowError>;

    /// Register a consumer for notifications; idempotent
    fn link_with(&self, consumer: Weak<dyn ConsumerLink<T>>) -> Result<(), FlowError>;

    /// Forget a consumer; no-op if it was never linked.
    ///
    /// No notification reaches the consumer once this returns.
    fn unlink(&self, consumer: ConsumerId);

    /// Whether `consumer` is registered and has unread data
    fn has_data_for(&self, consumer: ConsumerId) -> bool;

    /// Read the next unread item for `consumer`
    fn consume_next_data_for(&self, consumer: &dyn ConsumerLink<T>) -> Result<T, FlowError>;
}

/// Consumer side of the link protocol.
///
/// Notifications are delivered with no buffer lock held. Implementations
/// may read, write or query the notifying buffer, but must not unlink from
/// it inside a notification.
pub trait ConsumerLink<T>: Send + Sync {
    /// Identity used by buffers to track this consumer's cursor
    fn consumer_id(&self) -> ConsumerId;

    /// Start draining `buffer`
    fn link_with(&self, buffer: Arc<dyn DataBuffer<T>>) -> Result<(), FlowError>;

    /// `buffer` holds unread data for this consumer
    fn activate_for(&self, buffer: BufferId) -> Result<(), FlowError>;

    /// This consumer has read everything `buffer` holds
    fn deactivate_for(&self, buffer: BufferId) -> Result<(), FlowError>;
}

/// Receiving end of a pipeline stage
pub trait Sink<T>: Send + Sync {
    /// Handle one item; called from the draining consumer's thread
    fn consume(&self, item: T);
}

/// Producing end of a pipeline stage
pub trait Source<T> {
    /// Publish one item to every linked consumer
    fn produce(&self, item: T) -> Result<(), FlowError>;

    /// Attach a consumer to this source's output buffer
    fn link_consumer(&self, consumer: &dyn ConsumerLink<T>) -> Result<(), FlowError>;
}
