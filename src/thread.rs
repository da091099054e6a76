use crate::{log, Error, Result};
use std::{fmt, thread};

/// Creation options for a [`Thread`], the equivalent of a `pthread_attr_t`.
///
/// Dropping the attributes does not affect threads already spawned with them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadAttr {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl ThreadAttr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the thread. Shows up in panic messages and debuggers.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Requests a stack of at least `size` bytes.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn get_stack_size(&self) -> Option<usize> {
        self.stack_size
    }

    fn builder(&self) -> Result<thread::Builder> {
        let mut builder = thread::Builder::new();
        if let Some(name) = &self.name {
            if name.contains('\0') {
                return Err(Error::InvalidArgument("thread name contains a nul byte"));
            }
            builder = builder.name(name.clone());
        }

        match self.stack_size {
            Some(0) => return Err(Error::InvalidArgument("thread stack size must be positive")),
            Some(size) => builder = builder.stack_size(size),
            None => {}
        }

        Ok(builder)
    }
}

/// A unit of work: a function together with the argument it will be called with.
///
/// The task owns its argument. If it is dropped without being run (for example
/// because a [`ThreadPool`](crate::ThreadPool) shut down first) the argument is
/// dropped with it.
pub struct Task {
    run: Box<dyn FnOnce() + Send + 'static>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Task { .. }")
    }
}

impl Task {
    /// Pairs `func` with the `arg` it will be invoked with.
    ///
    /// # Examples
    ///
    /// ```
    /// use blocksync::Task;
    /// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
    ///
    /// fn bump(counter: Arc<AtomicUsize>) {
    ///     counter.fetch_add(1, Ordering::Relaxed);
    /// }
    ///
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// Task::new(bump, counter.clone()).run();
    /// assert_eq!(counter.load(Ordering::Relaxed), 1);
    /// ```
    pub fn new<A>(func: fn(A), arg: A) -> Self
    where
        A: Send + 'static,
    {
        Self::from_fn(move || func(arg))
    }

    /// Wraps a closure which carries its own captured state.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { run: Box::new(f) }
    }

    /// Invokes the task on the current thread.
    pub fn run(self) {
        (self.run)()
    }
}

impl<F> From<F> for Task
where
    F: FnOnce() + Send + 'static,
{
    fn from(f: F) -> Self {
        Self::from_fn(f)
    }
}

/// An owned handle to a spawned OS thread.
///
/// Either [`join`](Thread::join) or [`detach`](Thread::detach) it.
/// Dropping the handle detaches the thread.
pub struct Thread<T = ()> {
    handle: thread::JoinHandle<T>,
}

impl<T> fmt::Debug for Thread<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

impl Thread<()> {
    /// Starts a new thread running `task`, using default attributes when `attr` is `None`.
    pub fn spawn(attr: Option<&ThreadAttr>, task: Task) -> Result<Self> {
        Self::spawn_with(attr, move || task.run())
    }
}

impl<T: Send + 'static> Thread<T> {
    /// Starts a new thread running `f` whose return value is handed back by [`join`](Thread::join).
    pub fn spawn_with<F>(attr: Option<&ThreadAttr>, f: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let builder = match attr {
            Some(attr) => attr.builder()?,
            None => thread::Builder::new(),
        };

        let handle = builder.spawn(f).map_err(|e| {
            log::warn!(error = %e, "failed to spawn thread");
            Error::Spawn(e)
        })?;

        log::trace!(thread = ?handle.thread().id(), "spawned thread");
        Ok(Self { handle })
    }
}

impl<T> Thread<T> {
    /// Blocks until the thread finishes and returns what it returned.
    ///
    /// A thread which panicked is reported as [`Error::Panicked`].
    pub fn join(self) -> Result<T> {
        self.handle.join().map_err(|_| Error::Panicked)
    }

    /// Lets the thread run to completion on its own;
    /// its resources are reclaimed by the OS when it exits.
    pub fn detach(self) {
        drop(self.handle);
    }

    pub fn id(&self) -> thread::ThreadId {
        self.handle.thread().id()
    }

    pub fn name(&self) -> Option<&str> {
        self.handle.thread().name()
    }
}
