//! Data Processing Scheduler
//!
//! Drains any number (up to a compile-time maximum) of linked ring buffers
//! on a dedicated worker thread and forwards every item to one sink.

mod scheduler;

pub use scheduler::{DataProcessingScheduler, SchedulerConfig, SchedulerState, DEFAULT_MAX_INPUTS};
