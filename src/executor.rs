//! Executor pool
//!
//! Foreign calls belonging to one logical owner (one environment handle)
//! must see a consistent relative order and must not be re-entered from
//! arbitrary threads. Routing all of an owner's calls through one assigned
//! executor serializes them without a global lock. Each executor is a
//! single-consumer FIFO queue drained by a dedicated OS thread; a panic
//! inside one task is caught and reported without killing the executor or
//! its sibling tasks.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;

/// A unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Called with the panic message when a task panics.
pub type PanicHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Called on each executor thread before it starts consuming tasks.
/// Receives the executor's index within the pool. Hosts use this to pin
/// the thread or initialize thread-local native state.
pub type StartHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Executor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutorState {
    /// Created, consumer thread not yet running.
    Idle = 0,
    /// Consumer loop is draining the queue.
    Running = 1,
    /// Graceful stop requested; queued tasks still run.
    Draining = 2,
    /// Immediate stop requested; queued tasks are abandoned.
    ShuttingDown = 3,
    /// Consumer thread has exited.
    Closed = 4,
}

impl ExecutorState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ExecutorState::Idle,
            1 => ExecutorState::Running,
            2 => ExecutorState::Draining,
            3 => ExecutorState::ShuttingDown,
            _ => ExecutorState::Closed,
        }
    }
}

/// Task submission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The whole pool has begun closing; retry is never meaningful.
    #[error("executor pool is closed")]
    PoolClosed,
    /// The targeted executor raced with shutdown and did not accept the
    /// task.
    #[error("executor did not accept the task")]
    ExecutorClosed,
}

enum Job {
    Run(Task),
    /// Sentinel enqueued by a graceful stop; tasks queued before it run,
    /// then the consumer exits.
    Drain,
}

/// Extract a printable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

/// A single-consumer FIFO task queue with panic isolation.
pub struct Executor {
    sender: Sender<Job>,
    state: Arc<AtomicU8>,
    /// First stop() wins; guarded by compare-and-swap.
    closing: Arc<AtomicBool>,
    /// Set by an immediate stop; the consumer abandons remaining jobs.
    abandon: Arc<AtomicBool>,
    /// Completion signal sent by the consumer thread as it exits.
    done: Receiver<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Executor {
    /// Spawn an executor with an unbounded queue and the default panic
    /// handler (logs via `log::error!`).
    pub fn new(index: usize) -> Self {
        Self::with_options(index, None, default_panic_handler(), None)
    }

    /// Spawn an executor with explicit queue bound, panic handler, and
    /// optional warm-up hook.
    pub fn with_options(
        index: usize,
        queue_bound: Option<usize>,
        panic_handler: PanicHandler,
        on_start: Option<StartHook>,
    ) -> Self {
        let (sender, receiver) = match queue_bound {
            Some(bound) => bounded(bound),
            None => unbounded(),
        };
        let (done_tx, done_rx) = bounded(1);

        let state = Arc::new(AtomicU8::new(ExecutorState::Idle as u8));
        let abandon = Arc::new(AtomicBool::new(false));

        let thread = {
            let state = Arc::clone(&state);
            let abandon = Arc::clone(&abandon);
            std::thread::Builder::new()
                .name(format!("rtbridge-exec-{}", index))
                .spawn(move || {
                    consumer_loop(index, receiver, state, abandon, panic_handler, on_start);
                    let _ = done_tx.send(());
                })
                .expect("failed to spawn executor thread")
        };

        Self {
            sender,
            state,
            closing: Arc::new(AtomicBool::new(false)),
            abandon,
            done: done_rx,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Enqueue a task.
    ///
    /// Rejected once closing has begun. May block the caller when the
    /// queue is bounded and full.
    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(SubmitError::ExecutorClosed);
        }
        self.sender
            .send(Job::Run(task))
            .map_err(|_| SubmitError::ExecutorClosed)
    }

    /// Request shutdown. Idempotent: only the first caller's `graceful`
    /// flag takes effect.
    ///
    /// Graceful shutdown lets every task queued before this call run to
    /// completion; immediate shutdown abandons whatever is still queued.
    pub fn stop(&self, graceful: bool) {
        if self
            .closing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if graceful {
            self.state
                .store(ExecutorState::Draining as u8, Ordering::Release);
            // The sentinel lands behind all previously queued tasks.
            let _ = self.sender.send(Job::Drain);
        } else {
            self.state
                .store(ExecutorState::ShuttingDown as u8, Ordering::Release);
            self.abandon.store(true, Ordering::Release);
            // Wake the consumer if it is parked on an empty queue. A full
            // bounded queue is fine to skip: the consumer is mid-task and
            // will observe the abandon flag on its next iteration.
            let _ = self.sender.try_send(Job::Drain);
        }
    }

    /// Block until the consumer thread has confirmed termination.
    pub fn join(&self) {
        let _ = self.done.recv();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecutorState {
        ExecutorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether shutdown has been requested.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

fn consumer_loop(
    index: usize,
    receiver: Receiver<Job>,
    state: Arc<AtomicU8>,
    abandon: Arc<AtomicBool>,
    panic_handler: PanicHandler,
    on_start: Option<StartHook>,
) {
    if let Some(hook) = on_start {
        hook(index);
    }
    // A stop requested before the consumer got here has already moved the
    // state past Idle; the state machine never moves backwards.
    let _ = state.compare_exchange(
        ExecutorState::Idle as u8,
        ExecutorState::Running as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
    );

    while let Ok(job) = receiver.recv() {
        if abandon.load(Ordering::Acquire) {
            break;
        }
        match job {
            Job::Run(task) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                    panic_handler(panic_message(payload.as_ref()));
                }
            }
            Job::Drain => break,
        }
    }

    state.store(ExecutorState::Closed as u8, Ordering::Release);
}

fn default_panic_handler() -> PanicHandler {
    Arc::new(|msg| log::error!("executor task panicked: {}", msg))
}

/// Configuration for [`ExecutorPool`].
pub struct ExecutorPoolBuilder {
    size: usize,
    queue_bound: Option<usize>,
    panic_handler: PanicHandler,
    on_start: Option<StartHook>,
}

impl ExecutorPoolBuilder {
    /// Start building a pool of `size` executors.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "executor pool requires at least one executor");
        Self {
            size,
            queue_bound: None,
            panic_handler: default_panic_handler(),
            on_start: None,
        }
    }

    /// Bound each executor's queue; submission blocks when full.
    pub fn queue_bound(mut self, bound: usize) -> Self {
        self.queue_bound = Some(bound);
        self
    }

    /// Replace the default panic handler.
    pub fn panic_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.panic_handler = Arc::new(handler);
        self
    }

    /// Run a hook on each executor thread before it consumes tasks.
    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(hook));
        self
    }

    /// Spawn the executors and assemble the pool.
    pub fn build(self) -> ExecutorPool {
        let executors: Vec<Executor> = (0..self.size)
            .map(|i| {
                Executor::with_options(
                    i,
                    self.queue_bound,
                    Arc::clone(&self.panic_handler),
                    self.on_start.clone(),
                )
            })
            .collect();

        // Modulo folds to a bitmask when the pool size is a power of two.
        let mask = if self.size.is_power_of_two() {
            Some(self.size - 1)
        } else {
            None
        };

        ExecutorPool {
            executors,
            cursor: AtomicUsize::new(0),
            mask,
            closing: AtomicBool::new(false),
        }
    }
}

/// Fixed set of executors with round-robin dispatch.
pub struct ExecutorPool {
    executors: Vec<Executor>,
    /// Round-robin cursor; unsigned wrap on overflow is well-defined and
    /// harmless under the mask/modulo.
    cursor: AtomicUsize,
    mask: Option<usize>,
    closing: AtomicBool,
}

impl ExecutorPool {
    /// Build a pool with default options.
    pub fn new(size: usize) -> Self {
        ExecutorPoolBuilder::new(size).build()
    }

    /// Route a task to one executor by round-robin.
    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(SubmitError::PoolClosed);
        }
        if self.executors.len() == 1 {
            return self.executors[0].submit(task);
        }

        let ticket = self.cursor.fetch_add(1, Ordering::Relaxed);
        let index = match self.mask {
            Some(mask) => ticket & mask,
            None => ticket % self.executors.len(),
        };
        self.executors[index].submit(task)
    }

    /// Submit to a specific executor, pinning an owner's calls to one
    /// consistent execution context.
    pub fn submit_to(&self, index: usize, task: Task) -> Result<(), SubmitError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(SubmitError::PoolClosed);
        }
        self.executors[index % self.executors.len()].submit(task)
    }

    /// Stop every executor with the same `graceful` flag and block until
    /// all have confirmed termination. Idempotent.
    pub fn release(&self, graceful: bool) {
        if self
            .closing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        for executor in &self.executors {
            executor.stop(graceful);
        }
        for executor in &self.executors {
            executor.join();
        }
    }

    /// Number of executors in the pool.
    pub fn size(&self) -> usize {
        self.executors.len()
    }

    /// Whether the pool has begun closing.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}
