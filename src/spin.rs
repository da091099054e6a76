use crate::{Error, Result};
use std::{
    fmt,
    hint::spin_loop,
    sync::atomic::{AtomicBool, Ordering},
};

/// A busy-waiting lock guarding a `T`.
///
/// Only worth it for critical sections much shorter than a scheduler time-slice:
/// waiting threads burn CPU and never yield to the OS. There is no fairness.
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;
pub type MappedSpinLockGuard<'a, T> = lock_api::MappedMutexGuard<'a, RawSpinLock, T>;

pub const fn const_spin_lock<T>(value: T) -> SpinLock<T> {
    SpinLock::const_new(<RawSpinLock as lock_api::RawMutex>::INIT, value)
}

struct Backoff {
    spin: u32,
}

impl Backoff {
    #[cfg(target_arch = "x86_64")]
    const MAX_SHIFT: u32 = 6;
    #[cfg(not(target_arch = "x86_64"))]
    const MAX_SHIFT: u32 = 4;

    fn new() -> Self {
        Self { spin: 0 }
    }

    fn spin(&mut self) {
        for _ in 0..(1u32 << self.spin) {
            spin_loop();
        }
        self.spin = (self.spin + 1).min(Self::MAX_SHIFT);
    }
}

/// The atomic flag behind [`SpinLock`].
///
/// Can be used on its own when there is no data to guard.
#[derive(Default)]
pub struct RawSpinLock {
    locked: AtomicBool,
}

impl fmt::Debug for RawSpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSpinLock")
            .field("locked", &self.locked.load(Ordering::Relaxed))
            .finish()
    }
}

impl RawSpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// A single test-and-set attempt which reports [`Error::WouldBlock`] if the flag was already set.
    pub fn try_acquire(&self) -> Result<()> {
        match lock_api::RawMutex::try_lock(self) {
            true => Ok(()),
            false => Err(Error::WouldBlock),
        }
    }
}

unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = lock_api::GuardSend;

    #[inline]
    fn lock(&self) {
        if !self.try_lock() {
            self.lock_slow();
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl RawSpinLock {
    #[cold]
    fn lock_slow(&self) {
        let mut backoff = Backoff::new();
        loop {
            // Spin on a plain load so waiters don't keep stealing the cache line from the owner.
            while self.locked.load(Ordering::Relaxed) {
                backoff.spin();
            }

            if lock_api::RawMutex::try_lock(self) {
                return;
            }
        }
    }
}
