// Copyright (c) 2020 kprotty
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::{run_tls_destructor, RawCondvar, RawLock, RawTlsKey};
use crate::{Error, Result};
use std::{
    cell::UnsafeCell,
    ffi::c_void,
    mem::{ManuallyDrop, MaybeUninit},
    ptr,
};

pub(crate) struct Platform;

impl super::Platform for Platform {
    type Lock = Lock;
    type Condvar = Condvar;
    type TlsKey = TlsKey;
}

#[inline]
fn check(status: libc::c_int, error: Error) -> Result<()> {
    match status {
        0 => Ok(()),
        _ => Err(error),
    }
}

/// `pthread_mutex_t` boxed so that it never moves after `pthread_mutex_init`.
pub(crate) struct Lock {
    mutex: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

unsafe impl Send for Lock {}
unsafe impl Sync for Lock {}

impl Lock {
    fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.mutex.get()
    }
}

unsafe impl RawLock for Lock {
    fn new() -> Result<Self> {
        let mutex = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));

        unsafe {
            let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
            check(
                libc::pthread_mutexattr_init(attr.as_mut_ptr()),
                Error::AllocationFailed,
            )?;

            // ERRORCHECK turns a recursive lock or a foreign unlock into EDEADLK/EPERM
            // instead of undefined behavior.
            let status = match libc::pthread_mutexattr_settype(
                attr.as_mut_ptr(),
                libc::PTHREAD_MUTEX_ERRORCHECK,
            ) {
                0 => libc::pthread_mutex_init(mutex.get(), attr.as_ptr()),
                status => status,
            };

            let _ = libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
            check(status, Error::AllocationFailed)?;
        }

        Ok(Self { mutex })
    }

    fn lock(&self) -> Result<()> {
        check(
            unsafe { libc::pthread_mutex_lock(self.raw()) },
            Error::LockFailed,
        )
    }

    fn try_lock(&self) -> Result<bool> {
        match unsafe { libc::pthread_mutex_trylock(self.raw()) } {
            0 => Ok(true),
            libc::EBUSY => Ok(false),
            _ => Err(Error::LockFailed),
        }
    }

    unsafe fn unlock(&self) -> Result<()> {
        check(libc::pthread_mutex_unlock(self.raw()), Error::LockFailed)
    }

    fn destroy(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        let mutex = unsafe { ptr::read(&this.mutex) };
        check(
            unsafe { libc::pthread_mutex_destroy(mutex.get()) },
            Error::LockFailed,
        )
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::pthread_mutex_destroy(self.raw());
        }
    }
}

/// `pthread_cond_t` boxed for the same reason as [`Lock`].
pub(crate) struct Condvar {
    cond: Box<UnsafeCell<libc::pthread_cond_t>>,
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

unsafe impl RawCondvar for Condvar {
    type Lock = Lock;

    fn new() -> Result<Self> {
        let cond = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));
        check(
            unsafe { libc::pthread_cond_init(cond.get(), ptr::null()) },
            Error::AllocationFailed,
        )?;
        Ok(Self { cond })
    }

    unsafe fn wait(&self, lock: &Lock) -> Result<()> {
        check(
            libc::pthread_cond_wait(self.cond.get(), lock.raw()),
            Error::LockFailed,
        )
    }

    fn notify_one(&self) -> Result<()> {
        check(
            unsafe { libc::pthread_cond_signal(self.cond.get()) },
            Error::LockFailed,
        )
    }

    fn notify_all(&self) -> Result<()> {
        check(
            unsafe { libc::pthread_cond_broadcast(self.cond.get()) },
            Error::LockFailed,
        )
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::pthread_cond_destroy(self.cond.get());
        }
    }
}

pub(crate) struct TlsKey {
    key: libc::pthread_key_t,
}

unsafe extern "C" fn destroy_value(value: *mut c_void) {
    run_tls_destructor(value)
}

unsafe impl RawTlsKey for TlsKey {
    fn new() -> Result<Self> {
        let mut key = MaybeUninit::<libc::pthread_key_t>::uninit();
        check(
            unsafe { libc::pthread_key_create(key.as_mut_ptr(), Some(destroy_value)) },
            Error::AllocationFailed,
        )?;

        Ok(Self {
            key: unsafe { key.assume_init() },
        })
    }

    fn get(&self) -> *mut c_void {
        unsafe { libc::pthread_getspecific(self.key) }
    }

    unsafe fn set(&self, value: *mut c_void) -> Result<()> {
        check(
            libc::pthread_setspecific(self.key, value as *const c_void),
            Error::LockFailed,
        )
    }
}

impl Drop for TlsKey {
    fn drop(&mut self) {
        // Values other threads still hold under this key are not destroyed.
        unsafe {
            let _ = libc::pthread_key_delete(self.key);
        }
    }
}
