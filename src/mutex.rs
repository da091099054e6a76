use crate::{
    sys::{self, RawLock},
    Error, Result,
};
use std::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
};

/// A mutual exclusion lock backed by the platform's native mutex
/// (`pthread_mutex_t` or `SRWLOCK`).
///
/// Unlike `std::sync::Mutex`, every operation that touches the OS reports
/// failure through [`Result`] and the lock is never poisoned.
///
/// The lock is not recursive: locking it again from the thread which already
/// holds it is a caller error. On POSIX targets this is reported as
/// [`Error::LockFailed`], elsewhere it deadlocks.
///
/// # Examples
///
/// ```
/// use blocksync::Mutex;
/// use std::{sync::Arc, thread};
///
/// let counter = Arc::new(Mutex::new(0).unwrap());
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let counter = Arc::clone(&counter);
///         thread::spawn(move || *counter.lock().unwrap() += 1)
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(*counter.lock().unwrap(), 4);
/// ```
pub struct Mutex<T: ?Sized> {
    raw: sys::Lock,
    value: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new unlocked mutex, allocating its native lock.
    pub fn new(value: T) -> Result<Self> {
        Ok(Self {
            raw: sys::Lock::new()?,
            value: UnsafeCell::new(value),
        })
    }

    /// Destroys the native lock and returns the protected value.
    ///
    /// Dropping the mutex does the same but silently ignores a failing destroy.
    pub fn erase(self) -> Result<T> {
        let Self { raw, value } = self;
        raw.destroy()?;
        Ok(value.into_inner())
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Blocks the current thread until the lock is acquired.
    pub fn lock(&self) -> Result<MutexGuard<'_, T>> {
        self.raw.lock()?;
        Ok(MutexGuard::new(self))
    }

    /// Acquires the lock only if nobody holds it,
    /// otherwise returns [`Error::WouldBlock`] immediately.
    pub fn try_lock(&self) -> Result<MutexGuard<'_, T>> {
        match self.raw.try_lock()? {
            true => Ok(MutexGuard::new(self)),
            false => Err(Error::WouldBlock),
        }
    }

    /// Returns a mutable reference to the protected value.
    /// No locking is needed since the borrow is exclusive.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    #[inline]
    pub fn data_ptr(&self) -> *mut T {
        self.value.get()
    }

    pub(crate) fn raw(&self) -> &sys::Lock {
        &self.raw
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Ok(guard) => d.field("data", &&*guard),
            Err(_) => d.field("data", &format_args!("<locked>")),
        };
        d.finish_non_exhaustive()
    }
}

/// RAII ownership of a [`Mutex`]. The lock is released when this is dropped.
///
/// Native mutexes must be unlocked by the thread that locked them,
/// so the guard cannot be sent to another thread.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<'a, T: ?Sized + Sync> Sync for MutexGuard<'a, T> {}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    /// Returns the mutex this guard holds.
    pub fn mutex(this: &Self) -> &'a Mutex<T> {
        this.mutex
    }

    /// Unlocks the mutex, reporting a native unlock failure
    /// which dropping the guard would otherwise swallow.
    pub fn unlock(this: Self) -> Result<()> {
        let mutex = this.mutex;
        mem::forget(this);
        unsafe { mutex.raw.unlock() }
    }
}

impl<'a, T: ?Sized> Drop for MutexGuard<'a, T> {
    fn drop(&mut self) {
        let _ = unsafe { self.mutex.raw.unlock() };
    }
}

impl<'a, T: ?Sized> Deref for MutexGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<'a, T: ?Sized> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<'a, T: fmt::Debug + ?Sized> fmt::Debug for MutexGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<'a, T: fmt::Display + ?Sized> fmt::Display for MutexGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}
