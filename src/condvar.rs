use crate::{
    const_spin_lock,
    sys::{self, RawCondvar},
    Error, MutexGuard, Result, SpinLock,
};
use std::fmt;

/// The mutex the current waiters went to sleep with.
struct Binding {
    /// Address of the native lock, meaningful only while `waiters > 0`.
    mutex: usize,
    waiters: usize,
}

/// A Condition Variable
///
/// Condition variables represent the ability to block a thread such that it
/// consumes no CPU time while waiting for an event to occur. Condition
/// variables are typically associated with a boolean predicate (a condition)
/// and a mutex. The predicate is always verified inside of the mutex before
/// determining that thread must block.
///
/// All threads waiting at the same time must use the same [`Mutex`](crate::Mutex).
/// A wait with a different one fails with [`Error::InvalidArgument`] instead
/// of blocking. Once every waiter has woken up the condvar may be used with
/// another mutex. Waits may wake up spuriously, so always re-check the predicate in a loop
/// or use [`wait_while`](Condvar::wait_while).
///
/// # Examples
///
/// ```
/// use blocksync::{Condvar, Mutex};
/// use std::{sync::Arc, thread};
///
/// let pair = Arc::new((Mutex::new(false).unwrap(), Condvar::new().unwrap()));
/// let pair2 = pair.clone();
///
/// thread::spawn(move || {
///     let (lock, cvar) = &*pair2;
///     *lock.lock().unwrap() = true;
///     cvar.notify_one().unwrap();
/// });
///
/// let (lock, cvar) = &*pair;
/// let mut started = lock.lock().unwrap();
/// while !*started {
///     cvar.wait(&mut started).unwrap();
/// }
/// ```
pub struct Condvar {
    raw: sys::Condvar,
    binding: SpinLock<Binding>,
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Condvar { .. }")
    }
}

impl Condvar {
    /// Creates a new condition variable which is ready to be waited on and
    /// notified.
    pub fn new() -> Result<Self> {
        Ok(Self {
            raw: sys::Condvar::new()?,
            binding: const_spin_lock(Binding {
                mutex: 0,
                waiters: 0,
            }),
        })
    }

    /// Blocks the current thread until this condition variable receives a
    /// notification.
    ///
    /// This function will atomically unlock the mutex specified (represented by
    /// `mutex_guard`) and block the current thread. This means that any calls
    /// to `notify_*()` which happen logically after the mutex is unlocked are
    /// candidates to wake this thread up. When this function call returns, the
    /// lock specified will have been re-acquired.
    ///
    /// Returns [`Error::InvalidArgument`] without blocking if other threads
    /// are waiting on this condvar with a different mutex.
    pub fn wait<T: ?Sized>(&self, mutex_guard: &mut MutexGuard<'_, T>) -> Result<()> {
        let raw = MutexGuard::mutex(mutex_guard).raw();
        self.bind(raw as *const sys::Lock as usize)?;
        // SAFETY: the guard proves the calling thread owns the mutex.
        let result = unsafe { self.raw.wait(raw) };
        self.binding.lock().waiters -= 1;
        result
    }

    fn bind(&self, mutex: usize) -> Result<()> {
        let mut binding = self.binding.lock();
        if binding.waiters == 0 {
            binding.mutex = mutex;
        } else if binding.mutex != mutex {
            return Err(Error::InvalidArgument(
                "condvar waited on with two different mutexes",
            ));
        }
        binding.waiters += 1;
        Ok(())
    }

    /// Blocks the current thread for as long as `condition` returns true,
    /// re-checking it under the lock after every wake up.
    pub fn wait_while<T: ?Sized>(
        &self,
        mutex_guard: &mut MutexGuard<'_, T>,
        mut condition: impl FnMut(&mut T) -> bool,
    ) -> Result<()> {
        while condition(&mut **mutex_guard) {
            self.wait(mutex_guard)?;
        }
        Ok(())
    }

    /// Wakes up at least one thread blocked on this condvar, if there are any.
    ///
    /// Calls to `notify_one` are not buffered in any way to subsequent waiters.
    pub fn notify_one(&self) -> Result<()> {
        self.raw.notify_one()
    }

    /// Wakes up all threads currently blocked on this condvar.
    pub fn notify_all(&self) -> Result<()> {
        self.raw.notify_all()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Condvar, Error, Mutex};
    use std::{
        sync::{mpsc::channel, Arc},
        thread,
    };

    #[test]
    fn smoke() {
        let c = Condvar::new().unwrap();
        c.notify_one().unwrap();
        c.notify_all().unwrap();
    }

    #[test]
    fn notify_one() {
        let m = Arc::new(Mutex::new(false).unwrap());
        let m2 = m.clone();
        let c = Arc::new(Condvar::new().unwrap());
        let c2 = c.clone();

        let mut g = m.lock().unwrap();
        let _t = thread::spawn(move || {
            let mut g = m2.lock().unwrap();
            *g = true;
            c2.notify_one().unwrap();
        });
        while !*g {
            c.wait(&mut g).unwrap();
        }
    }

    #[test]
    fn notify_all() {
        const N: usize = 10;

        let data = Arc::new((Mutex::new(0).unwrap(), Condvar::new().unwrap()));
        let (tx, rx) = channel();
        for _ in 0..N {
            let data = data.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let (lock, cond) = &*data;
                let mut cnt = lock.lock().unwrap();
                *cnt += 1;
                if *cnt == N {
                    tx.send(()).unwrap();
                }
                while *cnt != 0 {
                    cond.wait(&mut cnt).unwrap();
                }
                tx.send(()).unwrap();
            });
        }
        drop(tx);

        let (lock, cond) = &*data;
        rx.recv().unwrap();
        let mut cnt = lock.lock().unwrap();
        *cnt = 0;
        cond.notify_all().unwrap();
        drop(cnt);

        for _ in 0..N {
            rx.recv().unwrap();
        }
    }

    #[test]
    fn wait_while() {
        let pair = Arc::new((Mutex::new(0u32).unwrap(), Condvar::new().unwrap()));
        let pair2 = pair.clone();

        let t = thread::spawn(move || {
            let (lock, cond) = &*pair2;
            for _ in 0..5 {
                *lock.lock().unwrap() += 1;
                cond.notify_one().unwrap();
            }
        });

        let (lock, cond) = &*pair;
        let mut value = lock.lock().unwrap();
        cond.wait_while(&mut value, |v| *v < 5).unwrap();
        assert_eq!(*value, 5);
        drop(value);
        t.join().unwrap();
    }

    #[test]
    fn producer_consumer_handoff() {
        const ITEMS: usize = 1000;

        let shared = Arc::new((Mutex::new(Vec::new()).unwrap(), Condvar::new().unwrap()));
        let consumer = {
            let shared = shared.clone();
            thread::spawn(move || {
                let (lock, cond) = &*shared;
                let mut received = Vec::with_capacity(ITEMS);
                while received.len() < ITEMS {
                    let mut queue = lock.lock().unwrap();
                    cond.wait_while(&mut queue, |q| q.is_empty()).unwrap();
                    received.extend(queue.drain(..));
                }
                received
            })
        };

        let (lock, cond) = &*shared;
        for item in 0..ITEMS {
            lock.lock().unwrap().push(item);
            cond.notify_one().unwrap();
        }

        let received = consumer.join().unwrap();
        assert_eq!(received, (0..ITEMS).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_waits_share_one_mutex() {
        let first = Arc::new(Mutex::new(false).unwrap());
        let second = Arc::new(Mutex::new(()).unwrap());
        let c = Arc::new(Condvar::new().unwrap());

        let waiter = {
            let (first, c) = (first.clone(), c.clone());
            thread::spawn(move || {
                let mut ready = first.lock().unwrap();
                c.wait_while(&mut ready, |ready| !*ready).unwrap();
            })
        };
        while c.binding.lock().waiters == 0 {
            thread::yield_now();
        }

        let mut other = second.lock().unwrap();
        assert!(matches!(c.wait(&mut other), Err(Error::InvalidArgument(_))));
        drop(other);

        *first.lock().unwrap() = true;
        c.notify_all().unwrap();
        waiter.join().unwrap();

        // With nobody left waiting the condvar is free to pair with `second`.
        let mut other = second.lock().unwrap();
        let notifier = {
            let (second, c) = (second.clone(), c.clone());
            thread::spawn(move || {
                while c.binding.lock().waiters == 0 {
                    thread::yield_now();
                }
                let _guard = second.lock().unwrap();
                c.notify_all().unwrap();
            })
        };
        c.wait(&mut other).unwrap();
        drop(other);
        notifier.join().unwrap();
    }

    #[test]
    fn test_debug_condvar() {
        let c = Condvar::new().unwrap();
        assert_eq!(format!("{:?}", c), "Condvar { .. }");
    }
}
