//! A fixed set of worker threads draining a bounded FIFO queue of [`Task`]s.
//!
//! Producers never block on a full queue: [`ThreadPool::add_task`] reports
//! [`Error::QueueFull`] and leaves retrying to the caller. Shutdown is
//! immediate. Workers finish the task they are running, tasks still queued
//! are dropped without running, and dropping a task drops its argument.

mod config;
mod queue;

pub use self::config::{
    PoolConfig, ENV_QUEUE_CAPACITY, ENV_STACK_SIZE, ENV_THREADS, ENV_THREAD_NAME_PREFIX,
};

use self::queue::TaskQueue;
use crate::{log, Condvar, Error, Mutex, MutexGuard, Result, Task, Thread};
use std::{
    fmt, mem,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

struct State {
    queue: TaskQueue,
    /// Tasks dequeued by a worker and not finished yet.
    running: usize,
}

impl State {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running == 0
    }
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when a task is queued or shutdown begins.
    available: Condvar,
    /// Signalled when the queue empties out and no task is running.
    idle: Condvar,
    /// Mirror of `queue.len()`, written under `state`, readable without it.
    pending: AtomicUsize,
    /// Set once, never cleared.
    shutdown: AtomicBool,
    capacity: usize,
}

impl Shared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Queues `task` or hands it back. The pool lock is always released
    /// before this returns, so dropping a rejected task may touch the pool.
    fn try_submit(&self, task: Task) -> Result<(), Rejected> {
        if self.is_shutdown() {
            return Err(Rejected::new(Error::AlreadyShutdown, task));
        }

        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(error) => return Err(Rejected::new(error, task)),
        };
        // Re-checked under the lock so a task can't slip in after shutdown drained the queue.
        if self.is_shutdown() {
            drop(state);
            return Err(Rejected::new(Error::AlreadyShutdown, task));
        }

        if let Err(task) = state.queue.push(task) {
            drop(state);
            return Err(Rejected::new(Error::QueueFull, task));
        }

        if let Err(error) = self.available.notify_one() {
            // Still under the lock, so the back of the queue is the task just pushed.
            let task = state.queue.pop_back();
            drop(state);
            return Err(Rejected { error, task });
        }
        self.pending.store(state.queue.len(), Ordering::Release);

        MutexGuard::unlock(state).map_err(|error| Rejected { error, task: None })
    }

    fn submit(&self, task: Task) -> Result<()> {
        self.try_submit(task).map_err(Rejected::into_error)
    }

    /// Stops the pool after a worker hit a native failure so that nobody
    /// keeps waiting on work or idleness that will never come.
    fn abandon(&self) {
        self.shutdown.store(true, Ordering::Release);
        let state = self.state.lock();
        let _ = self.available.notify_all();
        let _ = self.idle.notify_all();
        drop(state);
    }

    fn worker_loop(&self, index: usize) {
        log::trace!(worker = index, "worker started");
        if let Err(error) = self.run_worker() {
            log::error!(worker = index, %error, "worker stopped on a native failure");
            self.abandon();
        }
        log::trace!(worker = index, "worker exiting");
    }

    fn run_worker(&self) -> Result<()> {
        loop {
            let mut state = self.state.lock()?;
            self.available.wait_while(&mut state, |state| {
                state.queue.is_empty() && !self.is_shutdown()
            })?;

            if self.is_shutdown() {
                return MutexGuard::unlock(state);
            }

            let task = match state.queue.pop() {
                Some(task) => task,
                None => continue,
            };
            state.running += 1;
            self.pending.store(state.queue.len(), Ordering::Release);
            MutexGuard::unlock(state)?;

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
                log::error!(panic = %panic_message(&*payload), "task panicked");
            }

            let mut state = self.state.lock()?;
            state.running -= 1;
            if state.is_idle() {
                self.idle.notify_all()?;
            }
            MutexGuard::unlock(state)?;
        }
    }
}

fn spawn_worker(shared: Arc<Shared>, config: &PoolConfig, index: usize) -> Result<Thread<()>> {
    #[cfg(test)]
    {
        if tests::spawn_fault_at(&shared, index) {
            return Err(Error::Spawn(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected spawn failure",
            )));
        }
    }

    let attr = config.worker_attr(index);
    Thread::spawn_with(Some(&attr), move || shared.worker_loop(index))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// A task the pool did not accept, together with the reason.
///
/// The task is handed back so the caller can retry it, run it elsewhere, or
/// drop it. It is `None` only when a native failure hit after the task was
/// already queued.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct Rejected {
    error: Error,
    task: Option<Task>,
}

impl Rejected {
    fn new(error: Error, task: Task) -> Self {
        Self {
            error,
            task: Some(task),
        }
    }

    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Takes back the task which was not queued.
    pub fn into_task(self) -> Option<Task> {
        self.task
    }

    pub fn into_error(self) -> Error {
        self.error
    }

    pub fn into_parts(self) -> (Error, Option<Task>) {
        (self.error, self.task)
    }
}

/// A fixed-size pool of worker threads fed through a bounded queue.
///
/// The pool is an owned value. Share submission rights through
/// [`handle`](ThreadPool::handle), not by putting the pool in a global.
///
/// # Examples
///
/// ```
/// use blocksync::{Task, ThreadPool};
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
///
/// fn bump(counter: Arc<AtomicUsize>) {
///     counter.fetch_add(1, Ordering::SeqCst);
/// }
///
/// let pool = ThreadPool::new(2, 16).unwrap();
/// let counter = Arc::new(AtomicUsize::new(0));
/// for _ in 0..8 {
///     pool.add_task(Task::new(bump, counter.clone())).unwrap();
/// }
///
/// pool.wait_idle().unwrap();
/// pool.shutdown().unwrap();
/// assert_eq!(counter.load(Ordering::SeqCst), 8);
/// ```
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<Thread<()>>,
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.workers.len())
            .field("capacity", &self.shared.capacity)
            .field("pending", &self.pending())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl ThreadPool {
    /// Starts `threads` workers sharing a queue of `capacity` slots.
    ///
    /// Both must be positive. If any worker fails to spawn, the ones already
    /// started are stopped and the error is returned.
    pub fn new(threads: usize, capacity: usize) -> Result<Self> {
        Self::with_config(
            PoolConfig::new()
                .threads(threads)
                .queue_capacity(capacity),
        )
    }

    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: TaskQueue::with_capacity(config.queue_capacity)?,
                running: 0,
            })?,
            available: Condvar::new()?,
            idle: Condvar::new()?,
            pending: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            capacity: config.queue_capacity,
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(config.threads),
        };

        for index in 0..config.threads {
            match spawn_worker(pool.shared.clone(), &config, index) {
                Ok(worker) => pool.workers.push(worker),
                Err(error) => {
                    log::warn!(spawned = index, %error, "thread pool creation failed");
                    // Dropping `pool` stops and joins the workers spawned so far.
                    return Err(error);
                }
            }
        }

        log::debug!(
            threads = config.threads,
            capacity = config.queue_capacity,
            "thread pool started"
        );
        Ok(pool)
    }

    /// Queues `task` for execution on some worker.
    ///
    /// Never blocks on a full queue. Returns [`Error::QueueFull`] instead,
    /// in which case `task` is dropped. Use [`try_add_task`](ThreadPool::try_add_task)
    /// to get it back.
    pub fn add_task(&self, task: Task) -> Result<()> {
        self.shared.submit(task)
    }

    /// Like [`add_task`](ThreadPool::add_task) but hands a task which was not
    /// queued back to the caller instead of dropping it.
    pub fn try_add_task(&self, task: Task) -> Result<(), Rejected> {
        self.shared.try_submit(task)
    }

    /// Queues a closure, see [`add_task`](ThreadPool::add_task).
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_task(Task::from_fn(f))
    }

    /// A cloneable submitter which outlives neither the pool's queue nor its shutdown.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: self.shared.clone(),
        }
    }

    /// Number of tasks queued and not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Blocks until the queue is empty and no worker is running a task,
    /// or until the pool shuts down.
    ///
    /// Tasks submitted concurrently through a [`PoolHandle`] may keep the pool busy indefinitely.
    pub fn wait_idle(&self) -> Result<()> {
        let mut state = self.shared.state.lock()?;
        self.shared.idle.wait_while(&mut state, |state| {
            !state.is_idle() && !self.shared.is_shutdown()
        })?;
        MutexGuard::unlock(state)
    }

    /// Stops the pool and joins every worker.
    ///
    /// Running tasks are allowed to finish, queued ones are dropped.
    /// Dropping the pool does the same but ignores errors.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<()> {
        let shared = &*self.shared;
        if shared.shutdown.swap(true, Ordering::AcqRel) && self.workers.is_empty() {
            return Ok(());
        }
        log::debug!(threads = self.workers.len(), "thread pool shutting down");

        // Workers test the flag under the lock, so broadcasting under it can't be missed.
        let state = shared.state.lock()?;
        shared.available.notify_all()?;
        shared.idle.notify_all()?;
        MutexGuard::unlock(state)?;

        let mut result = Ok(());
        for worker in mem::take(&mut self.workers) {
            if let Err(error) = worker.join() {
                log::warn!(%error, "failed to join worker");
                result = result.and(Err(error));
            }
        }

        let mut state = shared.state.lock()?;
        let dropped = state.queue.drain();
        shared.pending.store(0, Ordering::Release);
        MutexGuard::unlock(state)?;

        if !dropped.is_empty() {
            log::debug!(dropped = dropped.len(), "dropping tasks queued at shutdown");
        }
        drop(dropped);

        log::debug!("thread pool shut down");
        result
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let _ = self.shutdown_inner();
    }
}

/// A cloneable way to submit work to a [`ThreadPool`] from other threads.
///
/// Submitting after the pool shut down fails with [`Error::AlreadyShutdown`].
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl PoolHandle {
    pub fn add_task(&self, task: Task) -> Result<()> {
        self.shared.submit(task)
    }

    pub fn try_add_task(&self, task: Task) -> Result<(), Rejected> {
        self.shared.try_submit(task)
    }

    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_task(Task::from_fn(f))
    }

    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }
}
