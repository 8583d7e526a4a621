//! Fixed-Capacity Arenas for Pending-Work Tracking
//!
//! A [`FixedArena`] is a fixed array of optional slots with a producer
//! marker, a consumer marker and a live count. It holds plain handles
//! (slot indices, ids, payload copies) and never owns what they refer to.
//!
//! Two synchronized variants are built on it:
//! - [`BoundedQueue`]: strict FIFO, no arbitrary removal
//! - [`BoundedRegistry`]: tolerates holes, supports membership and removal

use crate::FlowError;
use parking_lot::Mutex;

/// Where the producer marker puts the next stored item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Always the slot right after the previous store
    NextSlot,
    /// The first unoccupied slot at or after the producer marker
    FirstVacant,
}

/// Fixed array of `SIZE` optional slots with wrapping markers.
///
/// Not synchronized; see [`BoundedQueue`] and [`BoundedRegistry`].
#[derive(Debug)]
pub struct FixedArena<T, const SIZE: usize> {
    slots: [Option<T>; SIZE],
    placement: Placement,
    producer: usize,
    consumer: usize,
    live: usize,
}

impl<T, const SIZE: usize> FixedArena<T, SIZE> {
    const NON_EMPTY: () = assert!(SIZE > 0, "arena capacity must be non-zero");

    /// Create an empty arena with the given placement policy
    pub fn new(placement: Placement) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self {
            slots: std::array::from_fn(|_| None),
            placement,
            producer: 0,
            consumer: 0,
            live: 0,
        }
    }

    /// Store an item, failing if the arena is full
    pub fn store(&mut self, item: T) -> Result<(), FlowError> {
        if self.is_full() {
            return Err(FlowError::ArenaFull { capacity: SIZE });
        }

        if self.placement == Placement::FirstVacant {
            // Not full, so a vacancy exists within one lap.
            while self.slots[self.producer].is_some() {
                self.producer = Self::wrap(self.producer + 1);
            }
        }
        debug_assert!(self.slots[self.producer].is_none());

        self.slots[self.producer] = Some(item);
        self.producer = Self::wrap(self.producer + 1);
        self.live += 1;
        Ok(())
    }

    /// Take the item at the consumer marker, failing if the arena is empty
    pub fn consume_next(&mut self) -> Result<T, FlowError> {
        let index = self.next_occupied().ok_or(FlowError::ArenaEmpty)?;
        self.take_at(index).ok_or(FlowError::ArenaEmpty)
    }

    /// Advance the consumer marker past the next occupied slot and return
    /// that slot's index without clearing it
    pub fn next_occupied(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        loop {
            let index = self.consumer;
            self.consumer = Self::wrap(index + 1);
            if self.slots[index].is_some() {
                return Some(index);
            }
        }
    }

    /// Borrow the item the next consume would return
    pub fn front(&self) -> Option<&T> {
        (0..SIZE)
            .map(|offset| Self::wrap(self.consumer + offset))
            .find_map(|index| self.slots[index].as_ref())
    }

    /// Borrow the item in a slot
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Clear a slot and return what it held
    pub fn take_at(&mut self, index: usize) -> Option<T> {
        let item = self.slots.get_mut(index)?.take()?;
        self.live -= 1;
        Some(item)
    }

    /// Find the slot holding an equal item
    pub fn position(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.slots.iter().position(|slot| slot.as_ref() == Some(item))
    }

    /// Check if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Check if every slot is occupied
    pub fn is_full(&self) -> bool {
        self.live == SIZE
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.live
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        SIZE
    }

    fn wrap(index: usize) -> usize {
        index % SIZE
    }
}

/// Strict FIFO queue over a [`FixedArena`]
#[derive(Debug)]
pub struct BoundedQueue<T, const SIZE: usize> {
    arena: Mutex<FixedArena<T, SIZE>>,
}

impl<T, const SIZE: usize> BoundedQueue<T, SIZE> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            arena: Mutex::new(FixedArena::new(Placement::NextSlot)),
        }
    }

    /// Append an item, failing if the queue is full
    pub fn store(&self, item: T) -> Result<(), FlowError> {
        self.arena.lock().store(item)
    }

    /// Remove the oldest item, failing if the queue is empty
    pub fn consume_next(&self) -> Result<T, FlowError> {
        self.arena.lock().consume_next()
    }

    /// Copy of the oldest item, leaving it queued
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.arena.lock().front().cloned()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.arena.lock().is_empty()
    }

    /// Check if the queue is full
    pub fn is_full(&self) -> bool {
        self.arena.lock().is_full()
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.arena.lock().len()
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        SIZE
    }
}

impl<T, const SIZE: usize> Default for BoundedQueue<T, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

/// Membership-tracking registry over a [`FixedArena`].
///
/// Entries are addressed by value, so they can be removed in any order;
/// removal leaves a hole that the next store may fill.
#[derive(Debug)]
pub struct BoundedRegistry<T, const SIZE: usize> {
    arena: Mutex<FixedArena<T, SIZE>>,
}

impl<T: PartialEq, const SIZE: usize> BoundedRegistry<T, SIZE> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            arena: Mutex::new(FixedArena::new(Placement::FirstVacant)),
        }
    }

    /// Register an entry, failing if the registry is full
    pub fn store(&self, item: T) -> Result<(), FlowError> {
        self.arena.lock().store(item)
    }

    /// Remove and return the entry at the consumer marker
    pub fn consume_next(&self) -> Result<T, FlowError> {
        self.arena.lock().consume_next()
    }

    /// Check if an equal entry is registered
    pub fn contains(&self, item: &T) -> bool {
        self.arena.lock().position(item).is_some()
    }

    /// Remove an equal entry, failing if none is registered
    pub fn remove(&self, item: &T) -> Result<T, FlowError> {
        let mut arena = self.arena.lock();
        let index = arena.position(item).ok_or(FlowError::NotRegistered)?;
        arena.take_at(index).ok_or(FlowError::NotRegistered)
    }

    /// Next registered entry in round-robin order, left in place
    pub fn next_in_rotation(&self) -> Option<T>
    where
        T: Clone,
    {
        let mut arena = self.arena.lock();
        let index = arena.next_occupied()?;
        arena.get(index).cloned()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.arena.lock().is_empty()
    }

    /// Check if the registry is full
    pub fn is_full(&self) -> bool {
        self.arena.lock().is_full()
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.arena.lock().len()
    }
}

impl<T: PartialEq, const SIZE: usize> Default for BoundedRegistry<T, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fill_then_drain<const N: usize>() {
        let mut arena: FixedArena<usize, N> = FixedArena::new(Placement::NextSlot);
        for i in 0..N {
            assert!(!arena.is_full());
            arena.store(i).unwrap();
        }
        assert!(arena.is_full());
        assert!(matches!(arena.store(N), Err(FlowError::ArenaFull { capacity }) if capacity == N));

        for _ in 0..N {
            arena.consume_next().unwrap();
        }
        assert!(arena.is_empty());
        assert!(matches!(arena.consume_next(), Err(FlowError::ArenaEmpty)));
    }

    #[test]
    fn test_arena_capacity_boundaries() {
        fill_then_drain::<1>();
        fill_then_drain::<3>();
        fill_then_drain::<8>();
        fill_then_drain::<64>();
    }

    #[test]
    fn test_queue_markers_wrap() {
        let queue: BoundedQueue<u32, 3> = BoundedQueue::new();
        for round in 0..10 {
            queue.store(round * 2).unwrap();
            queue.store(round * 2 + 1).unwrap();
            assert_eq!(queue.consume_next().unwrap(), round * 2);
            assert_eq!(queue.consume_next().unwrap(), round * 2 + 1);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_peek_keeps_item() {
        let queue: BoundedQueue<u32, 2> = BoundedQueue::new();
        assert_eq!(queue.peek(), None);
        queue.store(1).unwrap();
        queue.store(2).unwrap();
        assert_eq!(queue.consume_next().unwrap(), 1);
        queue.store(3).unwrap();

        assert_eq!(queue.peek(), Some(2));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.consume_next().unwrap(), 2);
        assert_eq!(queue.peek(), Some(3));
    }

    #[test]
    fn test_registry_fills_holes() {
        let registry: BoundedRegistry<u8, 3> = BoundedRegistry::new();
        registry.store(1).unwrap();
        registry.store(2).unwrap();
        registry.store(3).unwrap();
        assert!(registry.is_full());

        registry.remove(&2).unwrap();
        assert!(!registry.is_full());
        registry.store(4).unwrap();
        assert!(registry.is_full());
        assert!(registry.contains(&4));
        assert!(!registry.contains(&2));
    }

    #[test]
    fn test_registry_consume_skips_holes() {
        let registry: BoundedRegistry<u8, 4> = BoundedRegistry::new();
        registry.store(10).unwrap();
        registry.store(20).unwrap();
        registry.store(30).unwrap();
        registry.remove(&10).unwrap();

        assert_eq!(registry.consume_next().unwrap(), 20);
        assert_eq!(registry.consume_next().unwrap(), 30);
        assert!(registry.consume_next().is_err());
    }

    #[test]
    fn test_rotation_visits_every_entry() {
        let registry: BoundedRegistry<u8, 4> = BoundedRegistry::new();
        registry.store(1).unwrap();
        registry.store(2).unwrap();
        registry.store(3).unwrap();

        let seen: Vec<u8> = (0..6).filter_map(|_| registry.next_in_rotation()).collect();
        assert_eq!(seen, vec![1, 2, 3, 1, 2, 3]);
        assert_eq!(registry.len(), 3);

        registry.remove(&2).unwrap();
        let seen: Vec<u8> = (0..4).filter_map(|_| registry.next_in_rotation()).collect();
        assert_eq!(seen, vec![1, 3, 1, 3]);
    }

    #[test]
    fn test_empty_rotation() {
        let registry: BoundedRegistry<u8, 2> = BoundedRegistry::new();
        assert_eq!(registry.next_in_rotation(), None);
    }

    proptest! {
        #[test]
        fn prop_queue_is_fifo(items in proptest::collection::vec(any::<u32>(), 0..16)) {
            let queue: BoundedQueue<u32, 16> = BoundedQueue::new();
            for item in &items {
                queue.store(*item).unwrap();
            }
            let drained: Vec<u32> = (0..items.len()).map(|_| queue.consume_next().unwrap()).collect();
            prop_assert_eq!(drained, items);
            prop_assert!(queue.is_empty());
        }

        #[test]
        fn prop_live_count_stays_in_bounds(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut arena: FixedArena<u8, 5> = FixedArena::new(Placement::NextSlot);
            let mut expected = 0usize;
            for store in ops {
                if store {
                    let stored = arena.store(0).is_ok();
                    prop_assert_eq!(stored, expected < 5);
                    if stored { expected += 1; }
                } else {
                    let consumed = arena.consume_next().is_ok();
                    prop_assert_eq!(consumed, expected > 0);
                    if consumed { expected -= 1; }
                }
                prop_assert_eq!(arena.len(), expected);
                prop_assert_eq!(arena.is_full(), expected == 5);
                prop_assert_eq!(arena.is_empty(), expected == 0);
            }
        }

        #[test]
        fn prop_registry_membership(entries in proptest::collection::hash_set(any::<u16>(), 1..8)) {
            let registry: BoundedRegistry<u16, 8> = BoundedRegistry::new();
            for entry in &entries {
                registry.store(*entry).unwrap();
                prop_assert!(registry.contains(entry));
            }
            for entry in &entries {
                registry.remove(entry).unwrap();
                prop_assert!(!registry.contains(entry));
                prop_assert!(matches!(registry.remove(entry), Err(FlowError::NotRegistered)));
            }
            prop_assert!(registry.is_empty());
        }
    }
}
