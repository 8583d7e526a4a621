//! Single-Writer Multi-Consumer Ring Buffer
//!
//! `N` pads are chained into a fixed cycle at construction; the writer and
//! every consumer cursor only ever move to `pad.next`. Each consumer keeps
//! its own cursor, so a slow consumer loses data without holding back the
//! writer or any other consumer.
//!
//! Notifications are decided under the cursor lock and delivered after it
//! is released, so a [`ConsumerLink`] may query or write its buffer from
//! inside `activate_for` / `deactivate_for`.

use crate::link::{BufferId, ConsumerId, ConsumerLink, DataBuffer};
use crate::FlowError;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Default number of pads per buffer
pub const DEFAULT_CAPACITY: usize = 64;

/// Default number of consumers per buffer
pub const DEFAULT_MAX_CONSUMERS: usize = 4;

/// One payload slot in the ring
struct Pad<T> {
    payload: Mutex<T>,
    /// Index of the following pad; fixed after construction
    next: usize,
}

struct Registration<T> {
    consumer: ConsumerId,
    /// Next pad this consumer will read
    cursor: usize,
    /// Notification handle; `None` for consumers that only ever consumed
    link: Option<Weak<dyn ConsumerLink<T>>>,
}

impl<T> Registration<T> {
    /// Linked consumer that has since been dropped
    fn is_dead(&self) -> bool {
        self.link.as_ref().map_or(false, |link| link.strong_count() == 0)
    }
}

struct Cursors<T> {
    /// Pad the next write fills
    writer: usize,
    consumers: Vec<Registration<T>>,
}

#[derive(Clone, Copy)]
enum Notice {
    Activate,
    Deactivate,
}

/// Fixed-capacity ring of `N` pads read by up to `C` consumers.
///
/// Writing always succeeds and always overwrites the oldest pad. A consumer
/// whose cursor sits on the writer's pad is caught up and must wait for the
/// next write. Payloads are handed out as clones, so `T` should be cheap to
/// clone (plain data or an `Arc`).
///
/// Usable from any thread; writes from several threads are serialized by an
/// internal lock, though a single producer per buffer is the intended use.
pub struct RingBuffer<T, const N: usize = DEFAULT_CAPACITY, const C: usize = DEFAULT_MAX_CONSUMERS>
{
    id: BufferId,
    pads: Box<[Pad<T>]>,
    cursors: Mutex<Cursors<T>>,
    /// Shared while notifications are delivered; `unlink` takes it
    /// exclusively to wait for deliveries already in flight
    delivery: RwLock<()>,
}

impl<T: Default, const N: usize, const C: usize> RingBuffer<T, N, C> {
    const VALID: () = assert!(
        N >= 2 && C >= 1,
        "ring buffer needs at least two pads and one consumer"
    );

    /// Create a ring of `N` default-initialized pads
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID;

        let mut pads: Vec<Pad<T>> = (0..N)
            .map(|index| Pad {
                payload: Mutex::new(T::default()),
                next: index + 1,
            })
            .collect();
        pads[N - 1].next = 0;

        Self {
            id: BufferId::next(),
            pads: pads.into_boxed_slice(),
            cursors: Mutex::new(Cursors {
                writer: 0,
                consumers: Vec::with_capacity(C),
            }),
            delivery: RwLock::new(()),
        }
    }
}

impl<T: Default, const N: usize, const C: usize> Default for RingBuffer<T, N, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize, const C: usize> RingBuffer<T, N, C> {
    /// Identity of this buffer
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Number of pads
    pub fn capacity(&self) -> usize {
        N
    }

    /// Maximum number of consumers
    pub fn max_consumers(&self) -> usize {
        C
    }

    /// Number of registered consumers
    pub fn consumer_count(&self) -> usize {
        self.cursors.lock().consumers.len()
    }

    /// Number of items `consumer` can still read, if it is registered
    pub fn backlog_for(&self, consumer: ConsumerId) -> Option<usize> {
        let cursors = self.cursors.lock();
        let registration = cursors.consumers.iter().find(|r| r.consumer == consumer)?;
        Some((cursors.writer + N - registration.cursor) % N)
    }

    /// Overwrite the writer's pad with `item`, advance the writer and
    /// notify linked consumers.
    ///
    /// Consumers that still have unread data are activated. A consumer the
    /// writer just lapped has nothing readable left and is deactivated.
    /// Every consumer is notified even if one of them fails; the first
    /// failure is returned.
    pub fn write(&self, item: T) -> Result<(), FlowError> {
        let (pending, _delivery) = {
            let mut cursors = self.cursors.lock();
            let pad = &self.pads[cursors.writer];
            *pad.payload.lock() = item;
            cursors.writer = pad.next;

            let writer = cursors.writer;
            let pending: Vec<(Arc<dyn ConsumerLink<T>>, Notice)> = cursors
                .consumers
                .iter()
                .filter_map(|registration| {
                    let consumer = registration.link.as_ref()?.upgrade()?;
                    if registration.cursor != writer {
                        Some((consumer, Notice::Activate))
                    } else {
                        trace!(buffer = %self.id, consumer = %registration.consumer, "writer lapped consumer");
                        Some((consumer, Notice::Deactivate))
                    }
                })
                .collect();
            (pending, self.delivery.read_recursive())
        };

        let mut outcome = Ok(());
        for (consumer, notice) in pending {
            if let Err(e) = self.deliver(consumer.as_ref(), notice) {
                debug!(buffer = %self.id, consumer = %consumer.consumer_id(), error = %e, "notification rejected");
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }

    /// Read the next unread item for `consumer`.
    ///
    /// Unknown consumers are registered on the spot with a cursor on the
    /// first pad. Reading while caught up is a protocol violation. When this
    /// read catches the consumer up, it is deactivated.
    pub fn consume_next_data_for(&self, consumer: &dyn ConsumerLink<T>) -> Result<T, FlowError>
    where
        T: Clone,
    {
        let consumer_id = consumer.consumer_id();
        let (item, caught_up, _delivery) = {
            let mut cursors = self.cursors.lock();
            let writer = cursors.writer;
            let index = self.registration_index(&mut cursors, consumer_id)?;

            let registration = &mut cursors.consumers[index];
            if registration.cursor == writer {
                return Err(FlowError::CaughtUp {
                    buffer: self.id,
                    consumer: consumer_id,
                });
            }

            let pad = &self.pads[registration.cursor];
            let item = pad.payload.lock().clone();
            registration.cursor = pad.next;
            (item, registration.cursor == writer, self.delivery.read_recursive())
        };

        if caught_up {
            self.deliver(consumer, Notice::Deactivate)?;
        }
        Ok(item)
    }

    /// Register `consumer` for notifications.
    ///
    /// Idempotent: an existing cursor is kept. If the consumer already has
    /// unread data it is activated right away.
    pub fn link_with(&self, consumer: Weak<dyn ConsumerLink<T>>) -> Result<(), FlowError> {
        let Some(link) = consumer.upgrade() else {
            debug!(buffer = %self.id, "ignoring link from a dropped consumer");
            return Ok(());
        };
        let consumer_id = link.consumer_id();

        let (pending, _delivery) = {
            let mut cursors = self.cursors.lock();
            let writer = cursors.writer;
            let index = self.registration_index(&mut cursors, consumer_id)?;

            let registration = &mut cursors.consumers[index];
            registration.link = Some(consumer);
            debug!(buffer = %self.id, consumer = %consumer_id, "consumer linked");
            (registration.cursor != writer, self.delivery.read_recursive())
        };

        if pending {
            self.deliver(link.as_ref(), Notice::Activate)?;
        }
        Ok(())
    }

    /// Drop the registration of `consumer`.
    ///
    /// Returns once notifications already in flight to it have been
    /// delivered, so none arrive afterwards. Must not be called from inside
    /// a notification of this buffer.
    pub fn unlink(&self, consumer: ConsumerId) {
        let removed = {
            let mut cursors = self.cursors.lock();
            let before = cursors.consumers.len();
            cursors.consumers.retain(|r| r.consumer != consumer);
            cursors.consumers.len() < before
        };
        drop(self.delivery.write());
        if removed {
            debug!(buffer = %self.id, %consumer, "consumer unlinked");
        }
    }

    fn deliver(&self, consumer: &dyn ConsumerLink<T>, notice: Notice) -> Result<(), FlowError> {
        match notice {
            Notice::Activate => consumer.activate_for(self.id),
            Notice::Deactivate => consumer.deactivate_for(self.id),
        }
    }

    fn registration_index(
        &self,
        cursors: &mut Cursors<T>,
        consumer: ConsumerId,
    ) -> Result<usize, FlowError> {
        if let Some(index) = cursors.consumers.iter().position(|r| r.consumer == consumer) {
            return Ok(index);
        }
        if cursors.consumers.len() >= C {
            let before = cursors.consumers.len();
            cursors.consumers.retain(|r| !r.is_dead());
            if cursors.consumers.len() < before {
                debug!(buffer = %self.id, reclaimed = before - cursors.consumers.len(), "dropped consumers reclaimed");
            }
        }
        if cursors.consumers.len() >= C {
            return Err(FlowError::TooManyConsumers {
                buffer: self.id,
                max: C,
            });
        }
        cursors.consumers.push(Registration {
            consumer,
            cursor: 0,
            link: None,
        });
        Ok(cursors.consumers.len() - 1)
    }
}

impl<T, const N: usize, const C: usize> DataBuffer<T> for RingBuffer<T, N, C>
where
    T: Clone + Send + 'static,
{
    fn id(&self) -> BufferId {
        self.id
    }

    fn write(&self, item: T) -> Result<(), FlowError> {
        RingBuffer::write(self, item)
    }

    fn link_with(&self, consumer: Weak<dyn ConsumerLink<T>>) -> Result<(), FlowError> {
        RingBuffer::link_with(self, consumer)
    }

    fn unlink(&self, consumer: ConsumerId) {
        RingBuffer::unlink(self, consumer)
    }

    fn has_data_for(&self, consumer: ConsumerId) -> bool {
        self.backlog_for(consumer).map_or(false, |backlog| backlog > 0)
    }

    fn consume_next_data_for(&self, consumer: &dyn ConsumerLink<T>) -> Result<T, FlowError> {
        RingBuffer::consume_next_data_for(self, consumer)
    }
}

impl<T, const N: usize, const C: usize> fmt::Debug for RingBuffer<T, N, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("id", &self.id)
            .field("capacity", &N)
            .field("max_consumers", &C)
            .field("consumers", &self.consumer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Records the notifications it receives
    struct Watcher {
        id: ConsumerId,
        activations: AtomicUsize,
        deactivations: AtomicUsize,
        active: AtomicBool,
    }

    impl Watcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ConsumerId::next(),
                activations: AtomicUsize::new(0),
                deactivations: AtomicUsize::new(0),
                active: AtomicBool::new(false),
            })
        }

        fn weak(self: &Arc<Self>) -> Weak<dyn ConsumerLink<u32>> {
            let weak: Weak<Watcher> = Arc::downgrade(self);
            weak
        }

        fn activations(&self) -> usize {
            self.activations.load(Ordering::SeqCst)
        }

        fn deactivations(&self) -> usize {
            self.deactivations.load(Ordering::SeqCst)
        }
    }

    impl ConsumerLink<u32> for Watcher {
        fn consumer_id(&self) -> ConsumerId {
            self.id
        }

        fn link_with(&self, _buffer: Arc<dyn DataBuffer<u32>>) -> Result<(), FlowError> {
            Ok(())
        }

        fn activate_for(&self, _buffer: BufferId) -> Result<(), FlowError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            self.active.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn deactivate_for(&self, _buffer: BufferId) -> Result<(), FlowError> {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
            self.active.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_write_then_consume() {
        let ring: RingBuffer<u32, 8, 2> = RingBuffer::new();
        let watcher = Watcher::new();

        ring.write(42).unwrap();
        assert_eq!(ring.consume_next_data_for(watcher.as_ref()).unwrap(), 42);
    }

    #[test]
    fn test_consume_when_caught_up_fails() {
        let ring: RingBuffer<u32, 4, 1> = RingBuffer::new();
        let watcher = Watcher::new();

        let result = ring.consume_next_data_for(watcher.as_ref());
        assert!(matches!(result, Err(FlowError::CaughtUp { .. })));

        ring.write(1).unwrap();
        ring.consume_next_data_for(watcher.as_ref()).unwrap();
        assert!(ring.consume_next_data_for(watcher.as_ref()).is_err());
    }

    #[test]
    fn test_overwrite_loses_oldest() {
        let ring: RingBuffer<u32, 4, 1> = RingBuffer::new();
        let watcher = Watcher::new();

        for value in 1..=5 {
            ring.write(value).unwrap();
        }

        let first = ring.consume_next_data_for(watcher.as_ref()).unwrap();
        assert_ne!(first, 1);
        assert_eq!(first, 5);
        assert!(ring.consume_next_data_for(watcher.as_ref()).is_err());
    }

    #[test]
    fn test_reads_follow_ring_order_across_wrap() {
        let ring: RingBuffer<u32, 3, 1> = RingBuffer::new();
        let watcher = Watcher::new();

        let mut read = Vec::new();
        for value in 0..10 {
            ring.write(value).unwrap();
            read.push(ring.consume_next_data_for(watcher.as_ref()).unwrap());
        }
        assert_eq!(read, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_deactivation_and_reactivation() {
        let ring: RingBuffer<u32, 8, 2> = RingBuffer::new();
        let watcher = Watcher::new();
        ring.link_with(watcher.weak()).unwrap();
        assert_eq!(watcher.activations(), 0);

        ring.write(1).unwrap();
        ring.write(2).unwrap();
        assert_eq!(watcher.activations(), 2);

        ring.consume_next_data_for(watcher.as_ref()).unwrap();
        assert_eq!(watcher.deactivations(), 0);
        ring.consume_next_data_for(watcher.as_ref()).unwrap();
        assert_eq!(watcher.deactivations(), 1);

        ring.write(3).unwrap();
        assert_eq!(watcher.activations(), 3);
        assert_eq!(watcher.deactivations(), 1);
    }

    #[test]
    fn test_link_with_pending_data_activates() {
        let ring: RingBuffer<u32, 8, 2> = RingBuffer::new();
        ring.write(7).unwrap();

        let watcher = Watcher::new();
        ring.link_with(watcher.weak()).unwrap();
        assert_eq!(watcher.activations(), 1);
        assert_eq!(ring.backlog_for(watcher.id), Some(1));

        // Relinking keeps the cursor
        ring.link_with(watcher.weak()).unwrap();
        assert_eq!(ring.consumer_count(), 1);
        assert_eq!(ring.consume_next_data_for(watcher.as_ref()).unwrap(), 7);
    }

    #[test]
    fn test_lapped_consumer_is_deactivated() {
        let ring: RingBuffer<u32, 3, 1> = RingBuffer::new();
        let watcher = Watcher::new();
        ring.link_with(watcher.weak()).unwrap();

        ring.write(1).unwrap();
        ring.write(2).unwrap();
        assert!(watcher.active.load(Ordering::SeqCst));

        // Third write brings the writer back onto the consumer's cursor
        ring.write(3).unwrap();
        assert_eq!(watcher.deactivations(), 1);
        assert!(!watcher.active.load(Ordering::SeqCst));
        assert_eq!(ring.backlog_for(watcher.id), Some(0));
    }

    #[test]
    fn test_consumer_capacity() {
        let ring: RingBuffer<u32, 4, 1> = RingBuffer::new();
        let first = Watcher::new();
        let second = Watcher::new();

        ring.link_with(first.weak()).unwrap();
        let result = ring.link_with(second.weak());
        assert!(matches!(result, Err(FlowError::TooManyConsumers { max: 1, .. })));
    }

    #[test]
    fn test_unlink_stops_notifications() {
        let ring: RingBuffer<u32, 4, 2> = RingBuffer::new();
        let watcher = Watcher::new();
        ring.link_with(watcher.weak()).unwrap();

        ring.write(1).unwrap();
        ring.unlink(watcher.id);
        ring.write(2).unwrap();

        assert_eq!(watcher.activations(), 1);
        assert_eq!(ring.consumer_count(), 0);
        assert_eq!(ring.backlog_for(watcher.id), None);
    }

    #[test]
    fn test_dropped_consumer_is_skipped() {
        let ring: RingBuffer<u32, 4, 2> = RingBuffer::new();
        let watcher = Watcher::new();
        ring.link_with(watcher.weak()).unwrap();
        drop(watcher);

        assert!(ring.write(1).is_ok());
    }

    #[test]
    fn test_concurrent_reader_sees_increasing_values() {
        let ring: Arc<RingBuffer<u32, 16, 1>> = Arc::new(RingBuffer::new());
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let ring = Arc::clone(&ring);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let watcher = Watcher::new();
                let mut last = None;
                let mut count = 0usize;
                loop {
                    let finished = done.load(Ordering::SeqCst);
                    match ring.consume_next_data_for(watcher.as_ref()) {
                        Ok(value) => {
                            assert!(last.map_or(true, |l| value > l));
                            last = Some(value);
                            count += 1;
                        }
                        Err(FlowError::CaughtUp { .. }) if finished => break,
                        Err(FlowError::CaughtUp { .. }) => thread::yield_now(),
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
                (last, count)
            })
        };

        for value in 1..=5_000 {
            ring.write(value).unwrap();
        }
        done.store(true, Ordering::SeqCst);

        // A lapped reader may end caught up without seeing the final value
        let (last, count) = reader.join().unwrap();
        assert!(last.map_or(true, |l| l <= 5_000));
        assert!(count <= 5_000);
    }

    /// Queries the notifying buffer from inside each notification
    struct Inspector {
        id: ConsumerId,
        ring: Arc<RingBuffer<u32, 8, 1>>,
        seen: parking_lot::Mutex<Vec<Option<usize>>>,
    }

    impl ConsumerLink<u32> for Inspector {
        fn consumer_id(&self) -> ConsumerId {
            self.id
        }

        fn link_with(&self, _buffer: Arc<dyn DataBuffer<u32>>) -> Result<(), FlowError> {
            Ok(())
        }

        fn activate_for(&self, _buffer: BufferId) -> Result<(), FlowError> {
            self.seen.lock().push(self.ring.backlog_for(self.id));
            Ok(())
        }

        fn deactivate_for(&self, _buffer: BufferId) -> Result<(), FlowError> {
            self.seen.lock().push(self.ring.backlog_for(self.id));
            Ok(())
        }
    }

    /// Refuses every activation
    struct Refuser {
        id: ConsumerId,
    }

    impl ConsumerLink<u32> for Refuser {
        fn consumer_id(&self) -> ConsumerId {
            self.id
        }

        fn link_with(&self, _buffer: Arc<dyn DataBuffer<u32>>) -> Result<(), FlowError> {
            Ok(())
        }

        fn activate_for(&self, buffer: BufferId) -> Result<(), FlowError> {
            Err(FlowError::UnlinkedActivation(buffer))
        }

        fn deactivate_for(&self, buffer: BufferId) -> Result<(), FlowError> {
            Err(FlowError::UnlinkedDeactivation(buffer))
        }
    }

    /// Takes its time with every activation
    struct SlowWatcher {
        id: ConsumerId,
        entered: AtomicBool,
        finished: AtomicBool,
    }

    impl ConsumerLink<u32> for SlowWatcher {
        fn consumer_id(&self) -> ConsumerId {
            self.id
        }

        fn link_with(&self, _buffer: Arc<dyn DataBuffer<u32>>) -> Result<(), FlowError> {
            Ok(())
        }

        fn activate_for(&self, _buffer: BufferId) -> Result<(), FlowError> {
            self.entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn deactivate_for(&self, _buffer: BufferId) -> Result<(), FlowError> {
            Ok(())
        }
    }

    #[test]
    fn test_notification_can_query_its_buffer() {
        let ring: Arc<RingBuffer<u32, 8, 1>> = Arc::new(RingBuffer::new());
        let inspector = Arc::new(Inspector {
            id: ConsumerId::next(),
            ring: Arc::clone(&ring),
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let weak: Weak<Inspector> = Arc::downgrade(&inspector);
        ring.link_with(weak).unwrap();

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let writer = {
            let ring = Arc::clone(&ring);
            let inspector = Arc::clone(&inspector);
            thread::spawn(move || {
                ring.write(1).unwrap();
                ring.write(2).unwrap();
                ring.consume_next_data_for(inspector.as_ref()).unwrap();
                ring.consume_next_data_for(inspector.as_ref()).unwrap();
                done_tx.send(()).unwrap();
            })
        };

        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("buffer calls blocked inside a notification");
        writer.join().unwrap();
        assert_eq!(*inspector.seen.lock(), vec![Some(1), Some(2), Some(0)]);
    }

    #[test]
    fn test_consumers_keep_independent_cursors() {
        let ring: RingBuffer<u32, 8, 2> = RingBuffer::new();
        let fast = Watcher::new();
        let slow = Watcher::new();
        ring.link_with(fast.weak()).unwrap();
        ring.link_with(slow.weak()).unwrap();

        let mut fast_read = Vec::new();
        let mut slow_read = Vec::new();
        for value in 1..=3 {
            ring.write(value).unwrap();
            fast_read.push(ring.consume_next_data_for(fast.as_ref()).unwrap());
        }
        assert_eq!(ring.backlog_for(fast.id), Some(0));
        assert_eq!(ring.backlog_for(slow.id), Some(3));
        assert!(slow.active.load(Ordering::SeqCst));
        assert!(!fast.active.load(Ordering::SeqCst));

        while let Ok(value) = ring.consume_next_data_for(slow.as_ref()) {
            slow_read.push(value);
        }
        assert_eq!(slow.deactivations(), 1);

        // The slow consumer falls a full lap behind, the fast one does not
        for value in 4..=11 {
            ring.write(value).unwrap();
            fast_read.push(ring.consume_next_data_for(fast.as_ref()).unwrap());
        }
        assert_eq!(ring.backlog_for(slow.id), Some(0));
        assert_eq!(slow.deactivations(), 2);

        ring.write(12).unwrap();
        fast_read.push(ring.consume_next_data_for(fast.as_ref()).unwrap());
        while let Ok(value) = ring.consume_next_data_for(slow.as_ref()) {
            slow_read.push(value);
        }

        assert_eq!(fast_read, (1..=12).collect::<Vec<_>>());
        assert_eq!(slow_read, vec![1, 2, 3, 12]);
        assert_eq!((fast.activations(), fast.deactivations()), (12, 12));
        assert_eq!((slow.activations(), slow.deactivations()), (11, 3));
    }

    #[test]
    fn test_rejected_notification_still_reaches_other_consumers() {
        let ring: RingBuffer<u32, 4, 2> = RingBuffer::new();
        let refuser = Arc::new(Refuser {
            id: ConsumerId::next(),
        });
        let weak: Weak<Refuser> = Arc::downgrade(&refuser);
        ring.link_with(weak).unwrap();
        let watcher = Watcher::new();
        ring.link_with(watcher.weak()).unwrap();

        let result = ring.write(1);
        assert!(matches!(result, Err(FlowError::UnlinkedActivation(id)) if id == ring.id()));
        assert_eq!(watcher.activations(), 1);
        assert_eq!(ring.consume_next_data_for(watcher.as_ref()).unwrap(), 1);
    }

    #[test]
    fn test_dropped_consumer_slot_is_reclaimed() {
        let ring: RingBuffer<u32, 4, 1> = RingBuffer::new();
        let first = Watcher::new();
        ring.link_with(first.weak()).unwrap();
        drop(first);

        let second = Watcher::new();
        ring.link_with(second.weak()).unwrap();
        assert_eq!(ring.consumer_count(), 1);

        ring.write(9).unwrap();
        assert_eq!(second.activations(), 1);
    }

    #[test]
    fn test_unlink_waits_for_delivery_in_flight() {
        let ring: Arc<RingBuffer<u32, 4, 1>> = Arc::new(RingBuffer::new());
        let watcher = Arc::new(SlowWatcher {
            id: ConsumerId::next(),
            entered: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });
        let weak: Weak<SlowWatcher> = Arc::downgrade(&watcher);
        ring.link_with(weak).unwrap();

        let writer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.write(1))
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !watcher.entered.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            thread::yield_now();
        }
        assert!(watcher.entered.load(Ordering::SeqCst));

        ring.unlink(watcher.id);
        assert!(watcher.finished.load(Ordering::SeqCst));
        writer.join().unwrap().unwrap();
        assert_eq!(ring.consumer_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_activation_tracks_readability(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let ring: RingBuffer<u32, 5, 1> = RingBuffer::new();
            let watcher = Watcher::new();
            ring.link_with(watcher.weak()).unwrap();

            let mut next_value = 0u32;
            let mut last_read: Option<u32> = None;
            for write in ops {
                let backlog = ring.backlog_for(watcher.id).unwrap();
                if write {
                    ring.write(next_value).unwrap();
                    next_value += 1;
                } else {
                    let result = ring.consume_next_data_for(watcher.as_ref());
                    prop_assert_eq!(result.is_ok(), backlog > 0);
                    if let Ok(value) = result {
                        prop_assert!(last_read.map_or(true, |l| value > l));
                        last_read = Some(value);
                    }
                }
                let readable = ring.backlog_for(watcher.id).unwrap() > 0;
                prop_assert_eq!(watcher.active.load(Ordering::SeqCst), readable);
            }
        }
    }
}
