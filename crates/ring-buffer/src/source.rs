//! Ring-Backed Pipeline Source

use crate::buffer::RingBuffer;
use crate::link::{BufferId, ConsumerLink, DataBuffer, Source};
use crate::FlowError;
use std::sync::Arc;

/// [`Source`] that publishes into an owned [`RingBuffer`].
///
/// Cloning shares the same buffer, which lets a producer thread and the
/// wiring code hold the source at the same time.
pub struct RingSource<T, const N: usize, const C: usize> {
    buffer: Arc<RingBuffer<T, N, C>>,
}

impl<T: Default, const N: usize, const C: usize> RingSource<T, N, C> {
    /// Create a source with a fresh buffer
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(RingBuffer::new()),
        }
    }
}

impl<T, const N: usize, const C: usize> RingSource<T, N, C> {
    /// Identity of the output buffer
    pub fn buffer_id(&self) -> BufferId {
        self.buffer.id()
    }

    /// The output buffer
    pub fn buffer(&self) -> &Arc<RingBuffer<T, N, C>> {
        &self.buffer
    }
}

impl<T: Default, const N: usize, const C: usize> Default for RingSource<T, N, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize, const C: usize> Clone for RingSource<T, N, C> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<T, const N: usize, const C: usize> Source<T> for RingSource<T, N, C>
where
    T: Clone + Send + 'static,
{
    fn produce(&self, item: T) -> Result<(), FlowError> {
        self.buffer.write(item)
    }

    fn link_consumer(&self, consumer: &dyn ConsumerLink<T>) -> Result<(), FlowError> {
        let buffer: Arc<dyn DataBuffer<T>> = self.buffer.clone();
        consumer.link_with(buffer)
    }
}
