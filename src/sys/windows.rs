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
use std::{cell::UnsafeCell, ffi::c_void};

pub(crate) struct Platform;

impl super::Platform for Platform {
    type Lock = Lock;
    type Condvar = Condvar;
    type TlsKey = TlsKey;
}

/// SRWLOCK in exclusive mode only.
/// It needs no destruction and may move while nobody holds or waits on it.
pub(crate) struct Lock {
    srwlock: UnsafeCell<winapi::SRWLOCK>,
}

unsafe impl Send for Lock {}
unsafe impl Sync for Lock {}

unsafe impl RawLock for Lock {
    fn new() -> Result<Self> {
        Ok(Self {
            srwlock: UnsafeCell::new(winapi::SRWLOCK_INIT),
        })
    }

    fn lock(&self) -> Result<()> {
        unsafe { winapi::AcquireSRWLockExclusive(self.srwlock.get()) };
        Ok(())
    }

    fn try_lock(&self) -> Result<bool> {
        let acquired = unsafe { winapi::TryAcquireSRWLockExclusive(self.srwlock.get()) };
        Ok(acquired != winapi::FALSE)
    }

    unsafe fn unlock(&self) -> Result<()> {
        winapi::ReleaseSRWLockExclusive(self.srwlock.get());
        Ok(())
    }

    fn destroy(self) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct Condvar {
    cond: UnsafeCell<winapi::CONDITION_VARIABLE>,
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

unsafe impl RawCondvar for Condvar {
    type Lock = Lock;

    fn new() -> Result<Self> {
        Ok(Self {
            cond: UnsafeCell::new(winapi::CONDITION_VARIABLE_INIT),
        })
    }

    unsafe fn wait(&self, lock: &Lock) -> Result<()> {
        match winapi::SleepConditionVariableSRW(
            self.cond.get(),
            lock.srwlock.get(),
            winapi::INFINITE,
            0,
        ) {
            0 => Err(Error::LockFailed),
            _ => Ok(()),
        }
    }

    fn notify_one(&self) -> Result<()> {
        unsafe { winapi::WakeConditionVariable(self.cond.get()) };
        Ok(())
    }

    fn notify_all(&self) -> Result<()> {
        unsafe { winapi::WakeAllConditionVariable(self.cond.get()) };
        Ok(())
    }
}

/// Fiber local storage is used over TlsAlloc as only it accepts a destructor callback.
pub(crate) struct TlsKey {
    index: winapi::DWORD,
}

extern "system" fn destroy_value(value: *mut c_void) {
    unsafe { run_tls_destructor(value) }
}

unsafe impl RawTlsKey for TlsKey {
    fn new() -> Result<Self> {
        match unsafe { winapi::FlsAlloc(Some(destroy_value)) } {
            winapi::FLS_OUT_OF_INDEXES => Err(Error::AllocationFailed),
            index => Ok(Self { index }),
        }
    }

    fn get(&self) -> *mut c_void {
        unsafe { winapi::FlsGetValue(self.index) }
    }

    unsafe fn set(&self, value: *mut c_void) -> Result<()> {
        match winapi::FlsSetValue(self.index, value) {
            0 => Err(Error::LockFailed),
            _ => Ok(()),
        }
    }
}

impl Drop for TlsKey {
    fn drop(&mut self) {
        // FlsFree runs the callback for every value still stored under the index.
        unsafe {
            let _ = winapi::FlsFree(self.index);
        }
    }
}

#[allow(non_camel_case_types, non_snake_case)]
mod winapi {
    use std::ffi::c_void;

    pub type DWORD = u32;
    pub type ULONG = u32;
    pub type BOOL = i32;
    pub type BOOLEAN = u8;
    pub type SRWLOCK = usize;
    pub type CONDITION_VARIABLE = usize;
    pub type PFLS_CALLBACK_FUNCTION = Option<extern "system" fn(*mut c_void)>;

    pub const FALSE: BOOLEAN = 0;
    pub const INFINITE: DWORD = 0xFFFF_FFFF;
    pub const FLS_OUT_OF_INDEXES: DWORD = 0xFFFF_FFFF;
    pub const SRWLOCK_INIT: SRWLOCK = 0;
    pub const CONDITION_VARIABLE_INIT: CONDITION_VARIABLE = 0;

    #[link(name = "kernel32")]
    extern "system" {
        pub fn AcquireSRWLockExclusive(lock: *mut SRWLOCK);
        pub fn TryAcquireSRWLockExclusive(lock: *mut SRWLOCK) -> BOOLEAN;
        pub fn ReleaseSRWLockExclusive(lock: *mut SRWLOCK);

        pub fn SleepConditionVariableSRW(
            cond: *mut CONDITION_VARIABLE,
            lock: *mut SRWLOCK,
            dwMilliseconds: DWORD,
            flags: ULONG,
        ) -> BOOL;
        pub fn WakeConditionVariable(cond: *mut CONDITION_VARIABLE);
        pub fn WakeAllConditionVariable(cond: *mut CONDITION_VARIABLE);

        pub fn FlsAlloc(callback: PFLS_CALLBACK_FUNCTION) -> DWORD;
        pub fn FlsGetValue(index: DWORD) -> *mut c_void;
        pub fn FlsSetValue(index: DWORD, value: *mut c_void) -> BOOL;
        pub fn FlsFree(index: DWORD) -> BOOL;
    }
}
