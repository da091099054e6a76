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

//! Native blocking primitives which every public type in the crate is built on.
//!
//! Each primitive is described by an unsafe trait and exactly one
//! implementation is compiled per target. Nothing above this module knows
//! which one was picked.

use crate::Result;
use std::ffi::c_void;

/// Groups the native primitives of one target together.
pub(crate) trait Platform {
    type Lock: RawLock;
    type Condvar: RawCondvar<Lock = Self::Lock>;
    type TlsKey: RawTlsKey;
}

/// An exclusive, non-recursive OS lock.
///
/// Implementations must keep the native object at a stable address for their
/// whole lifetime since the OS may hold pointers to it while threads wait.
pub(crate) unsafe trait RawLock: Send + Sync + Sized {
    fn new() -> Result<Self>;

    /// Blocks until the lock is owned by the caller.
    fn lock(&self) -> Result<()>;

    /// Returns `Ok(false)` without blocking if the lock is already owned.
    fn try_lock(&self) -> Result<bool>;

    /// # Safety
    ///
    /// The caller must be the thread currently owning the lock.
    unsafe fn unlock(&self) -> Result<()>;

    /// Releases the native resources, reporting failure instead of ignoring it like `Drop` does.
    fn destroy(self) -> Result<()>;
}

/// An OS wait queue used together with a [`RawLock`].
pub(crate) unsafe trait RawCondvar: Send + Sync + Sized {
    type Lock: RawLock;

    fn new() -> Result<Self>;

    /// Atomically releases `lock`, blocks, and re-acquires `lock` before returning.
    /// May return spuriously.
    ///
    /// # Safety
    ///
    /// The caller must own `lock`.
    unsafe fn wait(&self, lock: &Self::Lock) -> Result<()>;

    fn notify_one(&self) -> Result<()>;

    fn notify_all(&self) -> Result<()>;
}

/// A process-wide key naming one pointer-sized slot per thread.
///
/// Every non-null value stored through a key must point at a [`TlsHeader`].
/// When a thread exits with a non-null value the backend hands the value to
/// [`run_tls_destructor`].
pub(crate) unsafe trait RawTlsKey: Send + Sync + Sized {
    fn new() -> Result<Self>;

    fn get(&self) -> *mut c_void;

    /// # Safety
    ///
    /// `value` must be null or point to a live allocation starting with a [`TlsHeader`].
    unsafe fn set(&self, value: *mut c_void) -> Result<()>;
}

/// Prefix of every value stored through a [`RawTlsKey`].
/// It lets the untyped native destructor callback reach the typed drop.
#[repr(C)]
pub(crate) struct TlsHeader {
    pub(crate) drop_fn: unsafe fn(*mut TlsHeader),
}

/// Entry point for the native "thread is exiting" callbacks.
///
/// # Safety
///
/// `value` must be null or a pointer previously passed to [`RawTlsKey::set`]
/// which is not referenced anywhere else anymore.
pub(crate) unsafe fn run_tls_destructor(value: *mut c_void) {
    let header = value as *mut TlsHeader;
    if !header.is_null() {
        ((*header).drop_fn)(header);
    }
}

#[cfg(unix)]
mod posix;
#[cfg(unix)]
use posix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

#[cfg(not(any(unix, windows)))]
compile_error!("blocksync requires either a POSIX threads or a win32 target");

pub(crate) type DefaultPlatform = os::Platform;

pub(crate) type Lock = <DefaultPlatform as Platform>::Lock;
pub(crate) type Condvar = <DefaultPlatform as Platform>::Condvar;
pub(crate) type TlsKey = <DefaultPlatform as Platform>::TlsKey;
