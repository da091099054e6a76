//! Lifecycle logging which compiles away when the `tracing` feature is disabled.
//!
//! Only the thread pool and thread helpers log, and only at lifecycle edges.
//! The blocking primitives report everything through their return values.

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, trace, warn};

#[cfg(not(feature = "tracing"))]
mod noop {
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {debug, error, trace, warn};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use self::noop::{debug, error, trace, warn};
