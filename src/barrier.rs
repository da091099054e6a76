use crate::{Condvar, Error, Mutex, MutexGuard, Result};
use std::fmt;

struct BarrierState {
    /// Threads which arrived in the current round.
    count: usize,
    /// Bumped every time the barrier trips so waiters can tell their round apart from the next one.
    generation: usize,
}

/// A barrier enables multiple threads to synchronize the beginning
/// of some computation.
///
/// Barriers are re-usable: once `n` threads have rendezvoused the count resets
/// and the next `n` calls to [`wait()`] form a new round.
///
/// [`wait()`]: Barrier::wait
///
/// # Examples
///
/// ```
/// use blocksync::Barrier;
/// use std::sync::Arc;
/// use std::thread;
///
/// let mut handles = Vec::with_capacity(10);
/// let barrier = Arc::new(Barrier::new(10).unwrap());
/// for _ in 0..10 {
///     let c = Arc::clone(&barrier);
///     // The same messages will be printed together.
///     // You will NOT see any interleaving.
///     handles.push(thread::spawn(move|| {
///         println!("before wait");
///         c.wait().unwrap();
///         println!("after wait");
///     }));
/// }
/// // Wait for other threads to finish.
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// ```
pub struct Barrier {
    state: Mutex<BarrierState>,
    cond: Condvar,
    total: usize,
}

impl fmt::Debug for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Barrier")
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl Barrier {
    /// Creates a new barrier that can block a given number of threads.
    ///
    /// A barrier will block `n`-1 threads which call [`wait()`] and then wake
    /// up all threads at once when the `n`th thread calls [`wait()`].
    ///
    /// A barrier for zero threads could never trip,
    /// so `n == 0` is rejected with [`Error::InvalidArgument`].
    ///
    /// [`wait()`]: Barrier::wait
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidArgument("barrier count must be positive"));
        }

        Ok(Self {
            state: Mutex::new(BarrierState {
                count: 0,
                generation: 0,
            })?,
            cond: Condvar::new()?,
            total: n,
        })
    }

    /// The number of threads needed to trip the barrier.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Blocks the current thread until all threads have rendezvoused here.
    ///
    /// Passing the barrier is reported by `Ok`. Whether this thread was the one
    /// to trip it is a separate question answered by
    /// [`BarrierWaitResult::is_leader()`]: exactly one thread per round, the
    /// last to arrive, receives `true`.
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        let mut state = self.state.lock()?;
        let generation = state.generation;

        state.count += 1;
        if state.count == self.total {
            state.count = 0;
            state.generation = generation.wrapping_add(1);
            self.cond.notify_all()?;
            MutexGuard::unlock(state)?;
            return Ok(BarrierWaitResult(true));
        }

        self.cond
            .wait_while(&mut state, |state| state.generation == generation)?;
        MutexGuard::unlock(state)?;
        Ok(BarrierWaitResult(false))
    }
}

/// A `BarrierWaitResult` is returned by [`Barrier::wait()`] when all threads
/// in the [`Barrier`] have rendezvoused.
///
/// # Examples
///
/// ```
/// use blocksync::Barrier;
///
/// let barrier = Barrier::new(1).unwrap();
/// let barrier_wait_result = barrier.wait().unwrap();
/// ```
pub struct BarrierWaitResult(bool);

impl fmt::Debug for BarrierWaitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarrierWaitResult")
            .field("is_leader", &self.is_leader())
            .finish()
    }
}

impl BarrierWaitResult {
    /// Returns `true` if this thread is the "leader thread" for the call to
    /// [`Barrier::wait()`], meaning it arrived last and released the others.
    ///
    /// Only one thread will have `true` returned from their result, all other
    /// threads will have `false` returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use blocksync::Barrier;
    ///
    /// let barrier = Barrier::new(1).unwrap();
    /// let barrier_wait_result = barrier.wait().unwrap();
    /// println!("{:?}", barrier_wait_result.is_leader());
    /// ```
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.0
    }
}
