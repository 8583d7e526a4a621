//! Sensor Pipeline Data-Flow Core
//!
//! Single-writer / multi-consumer plumbing shared by every pipeline stage:
//! - [`RingBuffer`]: fixed ring of pads with per-consumer cursors
//! - [`BoundedQueue`] / [`BoundedRegistry`]: fixed arenas for pending work
//! - [`ConsumerLink`], [`Source`], [`Sink`]: the notification protocol and
//!   the stage interfaces built on it

mod arena;
mod buffer;
mod error;
mod link;
mod source;

pub use arena::{BoundedQueue, BoundedRegistry, FixedArena, Placement};
pub use buffer::{RingBuffer, DEFAULT_CAPACITY, DEFAULT_MAX_CONSUMERS};
pub use error::{FlowError, ViolationKind};
pub use link::{BufferId, ConsumerId, ConsumerLink, DataBuffer, Sink, Source};
pub use source::RingSource;
