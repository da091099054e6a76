use crate::{Condvar, Error, Mutex, MutexGuard, Result};
use std::fmt;

/// A counting semaphore built from a [`Mutex`] protected counter and a [`Condvar`].
///
/// [`wait`](Semaphore::wait) blocks while no permits are available and
/// [`post`](Semaphore::post) returns a permit, waking one waiter.
/// The count is only ever touched while holding the internal mutex,
/// so it can never be observed below zero.
///
/// # Examples
///
/// ```
/// use blocksync::Semaphore;
/// use std::{sync::Arc, thread};
///
/// let sem = Arc::new(Semaphore::new(0).unwrap());
/// let sem2 = sem.clone();
///
/// let t = thread::spawn(move || sem2.post().unwrap());
/// sem.wait().unwrap();
/// t.join().unwrap();
/// ```
pub struct Semaphore {
    value: Mutex<usize>,
    cond: Condvar,
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("value", &self.value)
            .finish()
    }
}

impl Semaphore {
    /// Creates a semaphore holding `initial` permits.
    pub fn new(initial: usize) -> Result<Self> {
        Ok(Self {
            value: Mutex::new(initial)?,
            cond: Condvar::new()?,
        })
    }

    /// Takes a permit, blocking until one is available.
    pub fn wait(&self) -> Result<()> {
        let mut value = self.value.lock()?;
        self.cond.wait_while(&mut value, |value| *value == 0)?;
        *value -= 1;
        MutexGuard::unlock(value)
    }

    /// Takes a permit if one is available right now,
    /// otherwise returns [`Error::WouldBlock`].
    pub fn try_wait(&self) -> Result<()> {
        let mut value = self.value.lock()?;
        if *value == 0 {
            return Err(Error::WouldBlock);
        }

        *value -= 1;
        MutexGuard::unlock(value)
    }

    /// Returns a permit and wakes up one thread blocked in [`wait`](Semaphore::wait).
    pub fn post(&self) -> Result<()> {
        let mut value = self.value.lock()?;
        *value = value
            .checked_add(1)
            .ok_or(Error::InvalidArgument("semaphore count overflowed"))?;

        self.cond.notify_one()?;
        MutexGuard::unlock(value)
    }

    /// Returns the number of permits available at the time of the call.
    pub fn value(&self) -> Result<usize> {
        Ok(*self.value.lock()?)
    }
}
