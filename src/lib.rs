//! Portable blocking synchronization primitives and a bounded thread pool,
//! built directly on POSIX threads or the win32 equivalents.
//!
//! Every fallible operation returns [`Result`]: native failures are not
//! swallowed, locks are never poisoned, and a full thread pool queue is an
//! ordinary [`Error::QueueFull`] rather than a blocking call.

#![warn(
    rust_2018_idioms,
    unreachable_pub,
    // missing_docs
    // missing_debug_implementations
)]

mod barrier;
mod condvar;
mod error;
mod log;
mod mutex;
mod pool;
mod semaphore;
mod spin;
mod sys;
mod thread;
mod tls;

pub use self::{
    barrier::{Barrier, BarrierWaitResult},
    condvar::Condvar,
    error::{Error, Result},
    mutex::{Mutex, MutexGuard},
    pool::{
        PoolConfig, PoolHandle, Rejected, ThreadPool, ENV_QUEUE_CAPACITY, ENV_STACK_SIZE,
        ENV_THREADS, ENV_THREAD_NAME_PREFIX,
    },
    semaphore::Semaphore,
    spin::{const_spin_lock, MappedSpinLockGuard, RawSpinLock, SpinLock, SpinLockGuard},
    thread::{Task, Thread, ThreadAttr},
    tls::TlsKey,
};
