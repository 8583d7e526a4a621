//! Data-Flow Error Types

use crate::link::{BufferId, ConsumerId};
use thiserror::Error;

/// Contract violations raised by the data-flow core.
///
/// Every variant is a wiring or protocol bug in a collaborator, never a
/// transient condition, so none of them is worth retrying.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Store into an arena that is already at capacity
    #[error("illegal store into a full arena (capacity {capacity})")]
    ArenaFull { capacity: usize },

    /// Consume from an arena holding nothing
    #[error("illegal consumption from an empty arena")]
    ArenaEmpty,

    /// Removal of an entry the registry does not hold
    #[error("illegal removal of an entry that is not registered")]
    NotRegistered,

    /// Consumer tried to read the pad the writer will fill next
    #[error("illegal consumption: {consumer} is caught up with the writer of {buffer}")]
    CaughtUp {
        buffer: BufferId,
        consumer: ConsumerId,
    },

    /// Buffer already tracks its maximum number of consumers
    #[error("illegal number of consumers for {buffer} (max {max})")]
    TooManyConsumers { buffer: BufferId, max: usize },

    /// Scheduler already drains its maximum number of input buffers
    #[error("illegal number of input buffers (max {max})")]
    TooManyInputs { max: usize },

    /// Buffer linked twice to the same scheduler
    #[error("illegal linking of already-linked {0}")]
    AlreadyLinked(BufferId),

    /// Activation from a buffer the scheduler does not know
    #[error("illegal activation from an unlinked {0}")]
    UnlinkedActivation(BufferId),

    /// Deactivation from a buffer the scheduler does not know
    #[error("illegal deactivation from an unlinked {0}")]
    UnlinkedDeactivation(BufferId),

    /// Unlink request for a buffer the scheduler does not know
    #[error("illegal unlinking of an unlinked {0}")]
    UnknownInput(BufferId),

    /// Link request after the scheduler received its terminate order
    #[error("illegal linking, scheduler has been stopped")]
    SchedulerStopped,

    /// Worker thread could not be created
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Worker thread ended by panicking
    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Broad category of a [`FlowError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A fixed capacity was exceeded
    Capacity,
    /// Something was read that holds no data
    Emptiness,
    /// An identity was linked twice or is unknown
    Identity,
    /// An operation arrived after shutdown started
    Lifecycle,
    /// The operating system refused a resource or a thread died
    Runtime,
}

impl FlowError {
    /// Get the violation category of this error
    pub fn kind(&self) -> ViolationKind {
        match self {
            FlowError::ArenaFull { .. }
            | FlowError::TooManyConsumers { .. }
            | FlowError::TooManyInputs { .. } => ViolationKind::Capacity,
            FlowError::ArenaEmpty | FlowError::CaughtUp { .. } => ViolationKind::Emptiness,
            FlowError::NotRegistered
            | FlowError::AlreadyLinked(_)
            | FlowError::UnlinkedActivation(_)
            | FlowError::UnlinkedDeactivation(_)
            | FlowError::UnknownInput(_) => ViolationKind::Identity,
            FlowError::SchedulerStopped => ViolationKind::Lifecycle,
            FlowError::Spawn(_) | FlowError::WorkerPanicked => ViolationKind::Runtime,
        }
    }
}
