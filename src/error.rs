use std::io;

/// The reason a primitive or pool operation failed.
///
/// Native API failures are not broken down by OS error code:
/// any failing `pthread_*` / win32 call surfaces as [`Error::LockFailed`],
/// or as [`Error::AllocationFailed`] when it happened while initializing.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A native lock, wait or wake call reported failure.
    /// The primitive should be considered unusable from here on.
    #[error("native synchronization call failed")]
    LockFailed,

    /// Native resources for a primitive could not be allocated or initialized.
    #[error("failed to allocate native synchronization resources")]
    AllocationFailed,

    /// The thread pool's task queue is at capacity.
    #[error("task queue is full")]
    QueueFull,

    /// A constructor or operation was given an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Work was submitted to a thread pool which has already shut down.
    #[error("thread pool has been shut down")]
    AlreadyShutdown,

    /// A non-blocking acquire found the resource unavailable.
    #[error("operation would block")]
    WouldBlock,

    /// The OS refused to create a new thread.
    #[error("failed to spawn thread")]
    Spawn(#[source] io::Error),

    /// The joined thread unwound instead of returning.
    #[error("thread panicked")]
    Panicked,
}

impl Error {
    /// Returns true for the expected, recoverable "queue is full" condition
    /// as opposed to a misuse or native failure.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::QueueFull)
    }

    /// Returns true if a non-blocking `try_*` call simply found the resource taken.
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
