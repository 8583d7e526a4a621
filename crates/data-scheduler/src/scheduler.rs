//! Data Processing Scheduler Implementation

use metrics::counter;
use parking_lot::{Condvar, Mutex, RwLock};
use ring_buffer::{BoundedRegistry, BufferId, ConsumerId, ConsumerLink, DataBuffer, FlowError, Sink};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Default maximum number of input buffers per scheduler
pub const DEFAULT_MAX_INPUTS: usize = 8;

/// Configuration for a data processing scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker thread name, also used in logs and metrics
    pub name: String,
    /// Longest idle wait before the worker re-checks its inputs (ms)
    pub idle_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "data-scheduler".to_string(),
            idle_timeout_ms: 50,
        }
    }
}

impl SchedulerConfig {
    /// Default configuration with a custom name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Idle wait as a duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.max(1))
    }
}

/// Lifecycle of a scheduler's worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Worker alive and draining
    Running,
    /// Terminate order received; worker drains what is already ready
    Stopping,
    /// Worker joined
    Stopped,
}

struct InputSlot<T> {
    id: BufferId,
    buffer: Arc<dyn DataBuffer<T>>,
}

/// State shared between the scheduler handle, its worker and the buffers
/// that notify it. Input buffers are addressed by slot index.
struct SchedulerCore<T, S, const MAX_INPUTS: usize> {
    id: ConsumerId,
    name: String,
    me: Weak<Self>,
    sink: Arc<S>,
    inputs: RwLock<Vec<Option<InputSlot<T>>>>,
    ready: BoundedRegistry<usize, MAX_INPUTS>,
    not_ready: BoundedRegistry<usize, MAX_INPUTS>,
    terminate: AtomicBool,
    /// Serializes linking, unlinking and the terminate order
    membership: Mutex<()>,
    /// Serializes moves between `ready` and `not_ready`
    transition: Mutex<()>,
    /// Held by the worker while it reads from a buffer, and by `unlink`
    consuming: Mutex<()>,
    idle: Mutex<()>,
    wakeup: Condvar,
    idle_timeout: Duration,
}

impl<T, S, const MAX_INPUTS: usize> SchedulerCore<T, S, MAX_INPUTS>
where
    T: Send + 'static,
    S: Sink<T> + 'static,
{
    fn slot_of(&self, buffer: BufferId) -> Option<usize> {
        self.inputs
            .read()
            .iter()
            .position(|slot| slot.as_ref().map_or(false, |input| input.id == buffer))
    }

    fn input(&self, slot: usize) -> Option<Arc<dyn DataBuffer<T>>> {
        self.inputs
            .read()
            .get(slot)
            .and_then(Option::as_ref)
            .map(|input| Arc::clone(&input.buffer))
    }

    fn input_count(&self) -> usize {
        self.inputs.read().iter().flatten().count()
    }

    fn link_input(&self, buffer: Arc<dyn DataBuffer<T>>) -> Result<(), FlowError> {
        let _membership = self.membership.lock();
        if self.terminate.load(Ordering::Acquire) {
            return Err(FlowError::SchedulerStopped);
        }

        let id = buffer.id();
        let slot = {
            let mut inputs = self.inputs.write();
            if inputs.iter().flatten().any(|input| input.id == id) {
                return Err(FlowError::AlreadyLinked(id));
            }
            let slot = inputs
                .iter()
                .position(Option::is_none)
                .ok_or(FlowError::TooManyInputs { max: MAX_INPUTS })?;
            inputs[slot] = Some(InputSlot {
                id,
                buffer: Arc::clone(&buffer),
            });
            self.not_ready.store(slot)?;
            slot
        };

        let me: Weak<dyn ConsumerLink<T>> = self.me.clone();
        if let Err(e) = buffer.link_with(me) {
            self.release_slot(slot);
            return Err(e);
        }

        info!(scheduler = %self.name, buffer = %id, slot, "input buffer linked");
        Ok(())
    }

    fn unlink_input(&self, buffer: BufferId) -> Result<(), FlowError> {
        let _membership = self.membership.lock();
        let slot = self.slot_of(buffer).ok_or(FlowError::UnknownInput(buffer))?;
        let input = self.input(slot).ok_or(FlowError::UnknownInput(buffer))?;
        {
            let _consuming = self.consuming.lock();
            input.unlink(self.id);
        }
        self.release_slot(slot);
        info!(scheduler = %self.name, %buffer, slot, "input buffer unlinked");
        Ok(())
    }

    /// Unlink every input; called once the worker has been joined
    fn unlink_all(&self) {
        let _membership = self.membership.lock();
        let linked: Vec<(usize, Arc<dyn DataBuffer<T>>)> = self
            .inputs
            .read()
            .iter()
            .enumerate()
            .filter_map(|(slot, input)| Some((slot, Arc::clone(&input.as_ref()?.buffer))))
            .collect();

        for (slot, buffer) in linked {
            {
                let _consuming = self.consuming.lock();
                buffer.unlink(self.id);
            }
            self.release_slot(slot);
            debug!(scheduler = %self.name, buffer = %buffer.id(), slot, "input buffer released");
        }
    }

    fn release_slot(&self, slot: usize) {
        if let Some(entry) = self.inputs.write().get_mut(slot) {
            *entry = None;
        }
        let _transition = self.transition.lock();
        for registry in [&self.ready, &self.not_ready] {
            if registry.contains(&slot) {
                registry.remove(&slot).ok();
            }
        }
    }

    fn activate(&self, buffer: BufferId) -> Result<(), FlowError> {
        let slot = self
            .slot_of(buffer)
            .ok_or(FlowError::UnlinkedActivation(buffer))?;
        let _transition = self.transition.lock();
        self.mark_ready(slot)
    }

    fn deactivate(&self, buffer: BufferId) -> Result<(), FlowError> {
        let slot = self
            .slot_of(buffer)
            .ok_or(FlowError::UnlinkedDeactivation(buffer))?;
        self.settle_idle(slot)
    }

    /// Caller holds `transition`
    fn mark_ready(&self, slot: usize) -> Result<(), FlowError> {
        if self.not_ready.contains(&slot) {
            self.not_ready.remove(&slot)?;
            self.ready.store(slot)?;
            self.wake();
        }
        Ok(())
    }

    /// Park `slot` unless its buffer has unread data again.
    ///
    /// Notifications can arrive out of order, so a deactivation may trail
    /// a write that already refilled the buffer.
    fn settle_idle(&self, slot: usize) -> Result<(), FlowError> {
        let _transition = self.transition.lock();
        if self.ready.contains(&slot) {
            self.ready.remove(&slot)?;
            self.not_ready.store(slot)?;
        }
        if self
            .input(slot)
            .map_or(false, |input| input.has_data_for(self.id))
        {
            self.mark_ready(slot)?;
        }
        Ok(())
    }

    fn wake(&self) {
        let _idle = self.idle.lock();
        self.wakeup.notify_one();
    }

    fn run(&self) -> Result<(), FlowError> {
        info!(scheduler = %self.name, "scheduler worker started");
        loop {
            match self.ready.next_in_rotation() {
                Some(slot) => self.forward_next(slot)?,
                None if self.terminate.load(Ordering::Acquire) => break,
                None => self.wait_for_work(),
            }
        }
        info!(scheduler = %self.name, "scheduler worker drained and stopped");
        Ok(())
    }

    fn forward_next(&self, slot: usize) -> Result<(), FlowError> {
        let item = {
            let _consuming = self.consuming.lock();
            // The slot may have been unlinked or reused since it was picked.
            if !self.ready.contains(&slot) {
                return Ok(());
            }
            let Some(buffer) = self.input(slot) else {
                return Ok(());
            };
            match buffer.consume_next_data_for(self) {
                Ok(item) => item,
                Err(FlowError::CaughtUp { buffer, .. }) => {
                    // Lapped by the writer, or picked on a stale activation
                    debug!(scheduler = %self.name, %buffer, "ready input had nothing to read");
                    return self.settle_idle(slot);
                }
                Err(e) => return Err(e),
            }
        };

        self.sink.consume(item);
        counter!("scheduler_items_forwarded", "scheduler" => self.name.clone()).increment(1);
        Ok(())
    }

    fn wait_for_work(&self) {
        let mut idle = self.idle.lock();
        if self.ready.is_empty() && !self.terminate.load(Ordering::Acquire) {
            self.wakeup.wait_for(&mut idle, self.idle_timeout);
        }
    }
}

impl<T, S, const MAX_INPUTS: usize> ConsumerLink<T> for SchedulerCore<T, S, MAX_INPUTS>
where
    T: Send + 'static,
    S: Sink<T> + 'static,
{
    fn consumer_id(&self) -> ConsumerId {
        self.id
    }

    fn link_with(&self, buffer: Arc<dyn DataBuffer<T>>) -> Result<(), FlowError> {
        self.link_input(buffer)
    }

    fn activate_for(&self, buffer: BufferId) -> Result<(), FlowError> {
        self.activate(buffer)
    }

    fn deactivate_for(&self, buffer: BufferId) -> Result<(), FlowError> {
        self.deactivate(buffer)
    }
}

/// Drains up to `MAX_INPUTS` linked buffers into a sink on a dedicated
/// worker thread.
///
/// The worker starts in [`new`](Self::new) and serves ready buffers in
/// round-robin order; when nothing is ready it parks until a buffer
/// activates it. [`terminate_and_join`](Self::terminate_and_join) lets the
/// worker finish every buffer that is already ready before it exits.
pub struct DataProcessingScheduler<T, S, const MAX_INPUTS: usize = DEFAULT_MAX_INPUTS>
where
    T: Send + 'static,
    S: Sink<T> + 'static,
{
    core: Arc<SchedulerCore<T, S, MAX_INPUTS>>,
    worker: Mutex<Option<JoinHandle<Result<(), FlowError>>>>,
    stopped: AtomicBool,
}

impl<T, S, const MAX_INPUTS: usize> DataProcessingScheduler<T, S, MAX_INPUTS>
where
    T: Send + 'static,
    S: Sink<T> + 'static,
{
    /// Create a scheduler feeding `sink` and start its worker thread
    pub fn new(sink: Arc<S>, config: SchedulerConfig) -> Result<Self, FlowError> {
        let core = Arc::new_cyclic(|me| SchedulerCore {
            id: ConsumerId::next(),
            name: config.name.clone(),
            me: me.clone(),
            sink,
            inputs: RwLock::new((0..MAX_INPUTS).map(|_| None).collect()),
            ready: BoundedRegistry::new(),
            not_ready: BoundedRegistry::new(),
            terminate: AtomicBool::new(false),
            membership: Mutex::new(()),
            transition: Mutex::new(()),
            consuming: Mutex::new(()),
            idle: Mutex::new(()),
            wakeup: Condvar::new(),
            idle_timeout: config.idle_timeout(),
        });

        let worker_core = Arc::clone(&core);
        let worker = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                let result = worker_core.run();
                if let Err(e) = &result {
                    error!(scheduler = %worker_core.name, error = %e, "scheduler worker failed");
                    worker_core.terminate.store(true, Ordering::Release);
                }
                result
            })?;

        debug!(scheduler = %config.name, max_inputs = MAX_INPUTS, "scheduler created");
        Ok(Self {
            core,
            worker: Mutex::new(Some(worker)),
            stopped: AtomicBool::new(false),
        })
    }

    /// Start draining `buffer`
    pub fn link_with(&self, buffer: Arc<dyn DataBuffer<T>>) -> Result<(), FlowError> {
        self.core.link_input(buffer)
    }

    /// Stop draining `buffer` and free its slot
    pub fn unlink(&self, buffer: BufferId) -> Result<(), FlowError> {
        self.core.unlink_input(buffer)
    }

    /// Order the worker to stop once every ready buffer is drained, join
    /// it and unlink from every input buffer.
    ///
    /// Safe to call repeatedly. The first call returns the worker's
    /// outcome; later calls return `Ok(())`.
    pub fn terminate_and_join(&self) -> Result<(), FlowError> {
        {
            let _membership = self.core.membership.lock();
            if !self.core.terminate.swap(true, Ordering::AcqRel) {
                info!(scheduler = %self.core.name, "terminate order received");
            }
        }
        self.core.wake();

        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        let outcome = worker.join().unwrap_or(Err(FlowError::WorkerPanicked));
        self.core.unlink_all();
        self.stopped.store(true, Ordering::Release);
        outcome
    }

    /// Current lifecycle state
    pub fn state(&self) -> SchedulerState {
        if self.stopped.load(Ordering::Acquire) {
            SchedulerState::Stopped
        } else if self.core.terminate.load(Ordering::Acquire) {
            SchedulerState::Stopping
        } else {
            SchedulerState::Running
        }
    }

    /// Number of linked input buffers
    pub fn input_count(&self) -> usize {
        self.core.input_count()
    }

    /// Number of linked buffers that currently hold unread data
    pub fn ready_count(&self) -> usize {
        self.core.ready.len()
    }

    /// Identity this scheduler uses as a consumer
    pub fn consumer_id(&self) -> ConsumerId {
        self.core.id
    }

    /// Scheduler name
    pub fn name(&self) -> &str {
        &self.core.name
    }
}

impl<T, S, const MAX_INPUTS: usize> ConsumerLink<T> for DataProcessingScheduler<T, S, MAX_INPUTS>
where
    T: Send + 'static,
    S: Sink<T> + 'static,
{
    fn consumer_id(&self) -> ConsumerId {
        self.core.id
    }

    fn link_with(&self, buffer: Arc<dyn DataBuffer<T>>) -> Result<(), FlowError> {
        self.core.link_input(buffer)
    }

    fn activate_for(&self, buffer: BufferId) -> Result<(), FlowError> {
        self.core.activate(buffer)
    }

    fn deactivate_for(&self, buffer: BufferId) -> Result<(), FlowError> {
        self.core.deactivate(buffer)
    }
}

impl<T, S, const MAX_INPUTS: usize> Drop for DataProcessingScheduler<T, S, MAX_INPUTS>
where
    T: Send + 'static,
    S: Sink<T> + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.terminate_and_join() {
            error!(scheduler = %self.core.name, error = %e, "scheduler stopped with error");
        }
    }
}
