// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runtime loading of shared libraries, so libsystemd is not a link-time dependency.

use std::ffi::{c_void, CStr};

/// Handle to a shared library opened with `dlopen`. Closed on drop.
pub(crate) struct DynLib {
    handle: *mut c_void,
}

// SAFETY: a dlopen handle is a process-global reference count; dlsym and dlclose are
// thread-safe.
unsafe impl Send for DynLib {}
unsafe impl Sync for DynLib {}

impl DynLib {
    pub(crate) fn open(name: &CStr) -> Result<Self, String> {
        // SAFETY: name is a valid C string. RTLD_NOW resolves all symbols immediately so a
        // broken library fails here rather than on first use.
        let handle = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(last_error().unwrap_or_else(|| "unknown dlopen error".to_string()));
        }
        Ok(Self { handle })
    }

    /// Looks up a symbol by name.
    ///
    /// # Safety
    ///
    /// The caller must cast the returned pointer to the symbol's real signature.
    pub(crate) unsafe fn sym(&self, name: &CStr) -> Result<*mut c_void, String> {
        // clear any stale error before the lookup
        last_error();
        let ptr = libc::dlsym(self.handle, name.as_ptr());
        if let Some(err) = last_error() {
            return Err(err);
        }
        if ptr.is_null() {
            return Err(format!("{} resolved to null", name.to_string_lossy()));
        }
        Ok(ptr)
    }
}

impl Drop for DynLib {
    fn drop(&mut self) {
        // SAFETY: handle came from a successful dlopen and is closed exactly once.
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

fn last_error() -> Option<String> {
    // SAFETY: dlerror returns either null or a thread-local C string valid until the next
    // dl* call on this thread; it is copied out immediately.
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned())
    }
}
