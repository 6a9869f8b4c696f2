//! Buffering and batching of canonical events ahead of dispatch.
//!
//! [`BatchingProcessor`] coalesces events into bounded batches, closing a batch when it reaches
//! `max_batch_size`, when it has been open for `max_batch_open`, or on an explicit
//! [`BatchingProcessor::flush`]. Closed batches are handed to an [`Executor`] with at most
//! `max_inflight_batches` dispatches running at once. Producers block inside `process` while the
//! engine is saturated: surfacing overload beats masking it behind an unbounded queue.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::executor::Executor;
use crate::processor::Processor;

/// Configuration for [`BatchingProcessor`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchingConfig {
    /// Upper bound on events per emitted batch.
    ///
    /// Defaults to [`BatchingConfig::DEFAULT_MAX_BATCH_SIZE`].
    pub max_batch_size: usize,
    /// Maximum time a non-empty batch stays open before it is force-flushed.
    ///
    /// `Duration::ZERO` disables time-based flushing: a batch is then closed only by the size
    /// trigger or an explicit flush. Defaults to [`BatchingConfig::DEFAULT_MAX_BATCH_OPEN`].
    pub max_batch_open: Duration,
    /// Number of batches that may be executing downstream at once.
    ///
    /// Defaults to [`BatchingConfig::DEFAULT_MAX_INFLIGHT_BATCHES`].
    pub max_inflight_batches: usize,
}

impl BatchingConfig {
    /// Default value for [`BatchingConfig::max_batch_size`].
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
    /// Default value for [`BatchingConfig::max_batch_open`].
    pub const DEFAULT_MAX_BATCH_OPEN: Duration = Duration::from_secs(10);
    /// Default value for [`BatchingConfig::max_inflight_batches`].
    pub const DEFAULT_MAX_INFLIGHT_BATCHES: usize = 1;

    /// Create a new `BatchingConfig` using default configuration.
    pub fn new() -> BatchingConfig {
        BatchingConfig::default()
    }

    /// Update max batch size with `max_batch_size`.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> BatchingConfig {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Update max batch open duration with `max_batch_open`.
    pub fn with_max_batch_open(mut self, max_batch_open: Duration) -> BatchingConfig {
        self.max_batch_open = max_batch_open;
        self
    }

    /// Update max inflight batches with `max_inflight_batches`.
    pub fn with_max_inflight_batches(mut self, max_inflight_batches: usize) -> BatchingConfig {
        self.max_inflight_batches = max_inflight_batches;
        self
    }
}

impl Default for BatchingConfig {
    fn default() -> BatchingConfig {
        BatchingConfig {
            max_batch_size: BatchingConfig::DEFAULT_MAX_BATCH_SIZE,
            max_batch_open: BatchingConfig::DEFAULT_MAX_BATCH_OPEN,
            max_inflight_batches: BatchingConfig::DEFAULT_MAX_INFLIGHT_BATCHES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    Running,
    Stopping,
    Stopped,
}

struct BatchState<E> {
    /// The batch currently accepting events.
    open_batch: Vec<E>,
    /// When `open_batch` received its first event. `None` iff `open_batch` is empty or time-based
    /// flushing is disabled.
    opened_at: Option<Instant>,
    /// Batches handed to the executor and not yet completed.
    inflight: usize,
    /// Batches detached from the open buffer whose submitter is still waiting for an inflight
    /// slot. Counted separately so a stop-drain cannot miss them.
    pending: usize,
    phase: Phase,
}

impl<E> BatchState<E> {
    fn detach(&mut self) -> Vec<E> {
        self.opened_at = None;
        std::mem::take(&mut self.open_batch)
    }
}

type DropHandler<E> = Box<dyn Fn(Vec<E>) + Send + Sync>;

struct Inner<E> {
    config: BatchingConfig,
    executor: Arc<dyn Executor>,
    sink: Arc<dyn Processor<E>>,
    state: Mutex<BatchState<E>>,
    /// Signalled whenever `inflight` or `pending` decreases.
    not_full: Condvar,
    /// Wakes the flush timer when a batch opens or the engine stops.
    timer_wake: Condvar,
    /// Receives events that could not be handed off before the stop timeout expired.
    drop_handler: Option<DropHandler<E>>,
}

impl<E> Inner<E> {
    fn lock_state(&self) -> MutexGuard<'_, BatchState<E>> {
        // The lock is only held for bookkeeping, so a poisoned lock means a bug in this module.
        self.state
            .lock()
            .expect("thread holding batching lock should not panic")
    }

    fn release_inflight_slot(&self) {
        let mut state = self.lock_state();
        state.inflight -= 1;
        drop(state);
        self.not_full.notify_all();
    }
}

impl<E: Send + 'static> Inner<E> {
    /// Reserve an inflight slot for an already-detached batch, blocking while the engine is
    /// saturated. The reservation is visible to a concurrent stop-drain through `pending`.
    fn acquire_inflight_slot<'a>(
        &self,
        mut state: MutexGuard<'a, BatchState<E>>,
    ) -> MutexGuard<'a, BatchState<E>> {
        state.pending += 1;
        while state.inflight >= self.config.max_inflight_batches {
            state = self
                .not_full
                .wait(state)
                .expect("thread holding batching lock should not panic");
        }
        state.pending -= 1;
        state.inflight += 1;
        state
    }

    fn submit(inner: &Arc<Inner<E>>, ready: Vec<E>) {
        let guard = InflightGuard {
            inner: Arc::clone(inner),
        };
        let sink = Arc::clone(&inner.sink);
        inner.executor.execute(Box::new(move || {
            let _guard = guard;
            if catch_unwind(AssertUnwindSafe(|| sink.process_batch(ready))).is_err() {
                log::warn!(target: "beacon", "batch sink panicked; inflight accounting is preserved");
            }
        }));
    }
}

/// Releases the reserved inflight slot when dispatch finishes, including when the sink panics or
/// the executor drops the task without running it.
struct InflightGuard<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Drop for InflightGuard<E> {
    fn drop(&mut self) {
        self.inner.release_inflight_slot();
    }
}

/// The batching engine at the heart of the pipeline's buffer stage.
///
/// Accepts canonical events from any number of producer threads and emits them downstream in
/// ordered batches of at most `max_batch_size` events. See the module documentation for the
/// triggers that close a batch.
///
/// The engine must be started with [`Processor::start`] before it accepts events, and is drained
/// with [`Processor::stop`]. Events submitted outside the running phase are logged and dropped.
pub struct BatchingProcessor<E> {
    inner: Arc<Inner<E>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<E: Send + 'static> BatchingProcessor<E> {
    /// Create a new engine emitting batches to `sink` via `executor`.
    ///
    /// Zero `max_batch_size` or `max_inflight_batches` are clamped up to 1.
    pub fn new(
        config: BatchingConfig,
        executor: Arc<dyn Executor>,
        sink: Arc<dyn Processor<E>>,
    ) -> BatchingProcessor<E> {
        let config = BatchingConfig {
            max_batch_size: config.max_batch_size.max(1),
            max_inflight_batches: config.max_inflight_batches.max(1),
            ..config
        };

        BatchingProcessor {
            inner: Arc::new(Inner {
                config,
                executor,
                sink,
                state: Mutex::new(BatchState {
                    open_batch: Vec::new(),
                    opened_at: None,
                    inflight: 0,
                    pending: 0,
                    phase: Phase::New,
                }),
                not_full: Condvar::new(),
                timer_wake: Condvar::new(),
                drop_handler: None,
            }),
            timer: Mutex::new(None),
        }
    }

    /// Install a handler receiving events that were abandoned because the stop timeout expired
    /// before they could be handed to the executor.
    ///
    /// Must be called before [`Processor::start`]; later calls are ignored.
    pub fn with_drop_handler(
        mut self,
        drop_handler: impl Fn(Vec<E>) + Send + Sync + 'static,
    ) -> BatchingProcessor<E> {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.drop_handler = Some(Box::new(drop_handler)),
            None => {
                log::debug!(target: "beacon", "ignoring drop handler installed after the engine started")
            }
        }
        self
    }

    /// Force-close the open batch and hand it to the executor.
    ///
    /// Returns once the batch has been submitted for dispatch, not once it has been dispatched.
    /// Calling `flush` with no open batch is a no-op, making the operation idempotent.
    pub fn flush(&self) {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        if state.open_batch.is_empty() {
            return;
        }
        let ready = state.detach();
        state = inner.acquire_inflight_slot(state);
        drop(state);
        Inner::submit(inner, ready);
    }

    fn drain(&self, deadline: Instant) -> bool {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        match state.phase {
            Phase::New => {
                state.phase = Phase::Stopped;
                return true;
            }
            Phase::Running => state.phase = Phase::Stopping,
            Phase::Stopping => {
                log::debug!(target: "beacon", "batching processor stop already in progress");
                return false;
            }
            Phase::Stopped => return true,
        }
        inner.timer_wake.notify_all();

        // Final flush of the open batch, bounded by the stop deadline.
        let mut ready = state.detach();
        if !ready.is_empty() {
            state.pending += 1;
            loop {
                if state.inflight < inner.config.max_inflight_batches {
                    state.pending -= 1;
                    state.inflight += 1;
                    drop(state);
                    Inner::submit(inner, std::mem::take(&mut ready));
                    state = inner.lock_state();
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    state.pending -= 1;
                    state.phase = Phase::Stopped;
                    drop(state);
                    inner.not_full.notify_all();
                    log::warn!(
                        target: "beacon",
                        "stop timed out; abandoning {} undelivered events",
                        ready.len()
                    );
                    match &inner.drop_handler {
                        Some(drop_handler) => drop_handler(ready),
                        None => {}
                    }
                    return false;
                }
                let (guard, _) = inner
                    .not_full
                    .wait_timeout(state, deadline - now)
                    .expect("thread holding batching lock should not panic");
                state = guard;
            }
        }

        // Wait for inflight and pending dispatches to finish.
        while state.inflight + state.pending > 0 {
            let now = Instant::now();
            if now >= deadline {
                state.phase = Phase::Stopped;
                drop(state);
                log::warn!(target: "beacon", "stop timed out with batches still inflight");
                return false;
            }
            let (guard, _) = inner
                .not_full
                .wait_timeout(state, deadline - now)
                .expect("thread holding batching lock should not panic");
            state = guard;
        }
        state.phase = Phase::Stopped;
        drop(state);
        inner.timer_wake.notify_all();
        self.join_timer();
        true
    }

    fn join_timer(&self) {
        let handle = self
            .timer
            .lock()
            .expect("thread holding timer handle lock should not panic")
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!(target: "beacon", "flush timer thread panicked");
            }
        }
    }
}

impl<E: Send + 'static> Processor<E> for BatchingProcessor<E> {
    fn process(&self, item: E) {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        if state.phase != Phase::Running {
            log::debug!(target: "beacon", "batching processor is not running; dropping event");
            return;
        }
        state.open_batch.push(item);
        if state.open_batch.len() == 1 && !inner.config.max_batch_open.is_zero() {
            state.opened_at = Some(Instant::now());
            inner.timer_wake.notify_one();
        }
        if state.open_batch.len() >= inner.config.max_batch_size {
            let ready = state.detach();
            state = inner.acquire_inflight_slot(state);
            drop(state);
            Inner::submit(inner, ready);
        }
    }

    /// Bulk form of [`BatchingProcessor::process`]: slices `items` into full batches directly,
    /// filling the open batch first. Observable behavior (batch boundaries, ordering) matches
    /// submitting the items one by one.
    fn process_batch(&self, items: Vec<E>) {
        let inner = &self.inner;
        let mut items = items.into_iter();
        let mut state = inner.lock_state();
        if state.phase != Phase::Running {
            log::debug!(
                target: "beacon",
                "batching processor is not running; dropping {} events",
                items.len()
            );
            return;
        }
        loop {
            while state.open_batch.len() < inner.config.max_batch_size {
                match items.next() {
                    Some(item) => {
                        state.open_batch.push(item);
                        if state.open_batch.len() == 1 && !inner.config.max_batch_open.is_zero() {
                            state.opened_at = Some(Instant::now());
                            inner.timer_wake.notify_one();
                        }
                    }
                    // Leftover items stay in the open batch until the next trigger.
                    None => return,
                }
            }
            let ready = state.detach();
            state = inner.acquire_inflight_slot(state);
            drop(state);
            Inner::submit(inner, ready);
            state = inner.lock_state();
        }
    }

    fn start(&self) {
        self.inner.sink.start();

        let mut state = self.inner.lock_state();
        if state.phase != Phase::New {
            log::debug!(target: "beacon", "batching processor already started");
            return;
        }
        state.phase = Phase::Running;
        drop(state);

        if !self.inner.config.max_batch_open.is_zero() {
            let inner = Arc::clone(&self.inner);
            let spawned = std::thread::Builder::new()
                .name("beacon-flush-timer".to_owned())
                .spawn(move || run_timer(inner));
            match spawned {
                Ok(handle) => {
                    *self
                        .timer
                        .lock()
                        .expect("thread holding timer handle lock should not panic") = Some(handle)
                }
                Err(err) => {
                    log::error!(
                        target: "beacon",
                        "failed to spawn flush timer; time-based flushing is disabled: {}",
                        err
                    )
                }
            }
        }
    }

    fn stop(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let drained = self.drain(deadline);
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.inner.sink.stop(remaining) && drained
    }
}

/// Flush-timer loop: waits until the open batch's deadline and force-flushes it.
///
/// A batch closed by the size trigger or an explicit flush resets `opened_at`, which doubles as
/// timer cancellation: a woken timer that observes no deadline goes back to sleep.
fn run_timer<E: Send + 'static>(inner: Arc<Inner<E>>) {
    let mut state = inner.lock_state();
    loop {
        if state.phase != Phase::Running {
            return;
        }
        match state.opened_at {
            None => {
                state = inner
                    .timer_wake
                    .wait(state)
                    .expect("thread holding batching lock should not panic");
            }
            Some(opened_at) => {
                let deadline = opened_at + inner.config.max_batch_open;
                let now = Instant::now();
                if now < deadline {
                    let (guard, _) = inner
                        .timer_wake
                        .wait_timeout(state, deadline - now)
                        .expect("thread holding batching lock should not panic");
                    state = guard;
                } else {
                    let ready = state.detach();
                    if ready.is_empty() {
                        continue;
                    }
                    state = inner.acquire_inflight_slot(state);
                    drop(state);
                    Inner::submit(&inner, ready);
                    state = inner.lock_state();
                }
            }
        }
    }
}
