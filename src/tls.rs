use crate::{
    sys::{self, RawTlsKey, TlsHeader},
    Result,
};
use std::{ffi::c_void, fmt, marker::PhantomData, ptr};

#[repr(C)]
struct Slot<T> {
    header: TlsHeader,
    value: T,
    destructor: Option<fn(T)>,
}

impl<T> Slot<T> {
    fn alloc(value: T, destructor: Option<fn(T)>) -> *mut c_void {
        let slot = Box::new(Self {
            header: TlsHeader {
                drop_fn: Self::destroy,
            },
            value,
            destructor,
        });
        Box::into_raw(slot) as *mut c_void
    }

    /// Reclaims the slot and returns its value without running the destructor.
    unsafe fn into_value(ptr: *mut c_void) -> T {
        Box::from_raw(ptr as *mut Self).value
    }

    unsafe fn destroy(header: *mut TlsHeader) {
        let slot = Box::from_raw(header as *mut Self);
        let Slot {
            value, destructor, ..
        } = *slot;
        match destructor {
            Some(destructor) => destructor(value),
            None => drop(value),
        }
    }
}

/// A process-wide key for a per-thread slot holding a `T`.
///
/// Every thread sees its own value under the key, unset until that thread
/// calls [`set`](TlsKey::set). When a thread exits, its value is dropped, or
/// handed to the destructor given to [`with_destructor`](TlsKey::with_destructor).
///
/// Dropping the key releases the native key. On POSIX targets the values other
/// threads still hold are leaked, on Windows their destructors run on the
/// dropping thread.
///
/// # Examples
///
/// ```
/// use blocksync::TlsKey;
/// use std::{sync::Arc, thread};
///
/// let key = Arc::new(TlsKey::<u32>::new().unwrap());
/// key.set(1).unwrap();
///
/// let key2 = key.clone();
/// thread::spawn(move || {
///     assert_eq!(key2.get(), None);
///     key2.set(2).unwrap();
///     assert_eq!(key2.get(), Some(2));
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(key.get(), Some(1));
/// ```
pub struct TlsKey<T: 'static> {
    raw: sys::TlsKey,
    destructor: Option<fn(T)>,
    _value: PhantomData<fn() -> T>,
}

unsafe impl<T: Send + 'static> Send for TlsKey<T> {}
unsafe impl<T: Send + 'static> Sync for TlsKey<T> {}

impl<T: 'static> fmt::Debug for TlsKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsKey")
            .field("is_set", &self.is_set())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> TlsKey<T> {
    /// Allocates a key whose per-thread values are simply dropped on thread exit.
    pub fn new() -> Result<Self> {
        Self::create(None)
    }

    /// Allocates a key which passes each thread's value to `destructor` on thread exit.
    pub fn with_destructor(destructor: fn(T)) -> Result<Self> {
        Self::create(Some(destructor))
    }

    fn create(destructor: Option<fn(T)>) -> Result<Self> {
        Ok(Self {
            raw: sys::TlsKey::new()?,
            destructor,
            _value: PhantomData,
        })
    }

    /// Returns true if the calling thread has a value stored under this key.
    pub fn is_set(&self) -> bool {
        !self.raw.get().is_null()
    }

    /// Stores `value` for the calling thread and returns the value it replaced.
    /// The replaced value does not go through the destructor.
    pub fn set(&self, value: T) -> Result<Option<T>> {
        let old = self.raw.get();
        let new = Slot::alloc(value, self.destructor);

        if let Err(error) = unsafe { self.raw.set(new) } {
            drop(unsafe { Slot::<T>::into_value(new) });
            return Err(error);
        }

        Ok(match old.is_null() {
            true => None,
            false => Some(unsafe { Slot::<T>::into_value(old) }),
        })
    }

    /// Removes and returns the calling thread's value, leaving the slot unset.
    pub fn take(&self) -> Result<Option<T>> {
        let old = self.raw.get();
        if old.is_null() {
            return Ok(None);
        }

        unsafe {
            self.raw.set(ptr::null_mut())?;
            Ok(Some(Slot::<T>::into_value(old)))
        }
    }

    /// Returns a copy of the calling thread's value.
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        let slot = self.raw.get() as *const Slot<T>;
        unsafe { slot.as_ref() }.map(|slot| slot.value.clone())
    }

    /// Runs `f` with mutable access to the calling thread's value.
    ///
    /// The value is detached from the key while `f` runs, so `f` observes the
    /// key as unset if it looks at it again. If `f` stores a new value, that
    /// one wins and the detached value is destroyed.
    pub fn with<R>(&self, f: impl FnOnce(Option<&mut T>) -> R) -> Result<R> {
        let slot = self.raw.get();
        if slot.is_null() {
            return Ok(f(None));
        }

        unsafe { self.raw.set(ptr::null_mut())? };

        struct Reattach<'a, T: 'static> {
            key: &'a TlsKey<T>,
            slot: *mut c_void,
        }

        impl<'a, T: 'static> Drop for Reattach<'a, T> {
            fn drop(&mut self) {
                unsafe {
                    let replaced = !self.key.raw.get().is_null();
                    if replaced || self.key.raw.set(self.slot).is_err() {
                        sys::run_tls_destructor(self.slot);
                    }
                }
            }
        }

        let reattach = Reattach { key: self, slot };
        let value = unsafe { &mut (*(slot as *mut Slot<T>)).value };
        let result = f(Some(value));
        drop(reattach);
        Ok(result)
    }
}
