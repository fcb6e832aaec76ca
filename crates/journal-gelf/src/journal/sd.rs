// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`LogSource`] backed by the local systemd journal.
//!
//! libsystemd is loaded at runtime with `dlopen`. A host without it fails at
//! [`SdJournal::open`] with [`JournalError::Library`], which callers treat as a fatal startup
//! error. The raw `sd_journal` handle is guarded by a mutex that every method acquires for
//! the duration of its libsystemd calls; the guard is released on every exit path.

use std::ffi::{c_int, c_void, CStr};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::dl::DynLib;
use super::{
    parse_field, AdvanceOutcome, LogSource, Record, WaitOutcome, WaitTimeout,
    REALTIME_TIMESTAMP_FIELD,
};
use crate::errors::JournalError;

const LIBSYSTEMD: &[u8] = b"libsystemd.so.0\0";

/// Only journal files generated on the local machine.
const SD_JOURNAL_LOCAL_ONLY: c_int = 1;

#[repr(C)]
struct RawJournal {
    _private: [u8; 0],
}

type FnOpen = unsafe extern "C" fn(ret: *mut *mut RawJournal, flags: c_int) -> c_int;
type FnClose = unsafe extern "C" fn(j: *mut RawJournal);
type FnNext = unsafe extern "C" fn(j: *mut RawJournal) -> c_int;
type FnSeekRealtimeUsec = unsafe extern "C" fn(j: *mut RawJournal, usec: u64) -> c_int;
type FnRestartData = unsafe extern "C" fn(j: *mut RawJournal);
type FnEnumerateData =
    unsafe extern "C" fn(j: *mut RawJournal, data: *mut *const c_void, length: *mut usize) -> c_int;
type FnGetRealtimeUsec = unsafe extern "C" fn(j: *mut RawJournal, usec: *mut u64) -> c_int;
type FnWait = unsafe extern "C" fn(j: *mut RawJournal, timeout_usec: u64) -> c_int;

macro_rules! load_sym {
    ($lib:expr, $name:literal, $ty:ty) => {{
        let name = CStr::from_bytes_with_nul(concat!($name, "\0").as_bytes())
            .map_err(|e| JournalError::Library(e.to_string()))?;
        // SAFETY: the pointer is cast to the signature documented in sd-journal(3).
        let ptr = unsafe { $lib.sym(name) }
            .map_err(|e| JournalError::Library(format!("failed to load {}: {}", $name, e)))?;
        unsafe { std::mem::transmute::<*mut c_void, $ty>(ptr) }
    }};
}

/// Resolved sd-journal entry points. Keeps the library loaded while it lives.
struct SdJournalApi {
    open: FnOpen,
    close: FnClose,
    next: FnNext,
    seek_realtime_usec: FnSeekRealtimeUsec,
    restart_data: FnRestartData,
    enumerate_data: FnEnumerateData,
    get_realtime_usec: FnGetRealtimeUsec,
    wait: FnWait,
    _lib: DynLib,
}

impl SdJournalApi {
    fn load() -> Result<Self, JournalError> {
        let name =
            CStr::from_bytes_with_nul(LIBSYSTEMD).map_err(|e| JournalError::Library(e.to_string()))?;
        let lib = DynLib::open(name).map_err(JournalError::Library)?;
        Ok(Self {
            open: load_sym!(lib, "sd_journal_open", FnOpen),
            close: load_sym!(lib, "sd_journal_close", FnClose),
            next: load_sym!(lib, "sd_journal_next", FnNext),
            seek_realtime_usec: load_sym!(lib, "sd_journal_seek_realtime_usec", FnSeekRealtimeUsec),
            restart_data: load_sym!(lib, "sd_journal_restart_data", FnRestartData),
            enumerate_data: load_sym!(lib, "sd_journal_enumerate_data", FnEnumerateData),
            get_realtime_usec: load_sym!(lib, "sd_journal_get_realtime_usec", FnGetRealtimeUsec),
            wait: load_sym!(lib, "sd_journal_wait", FnWait),
            _lib: lib,
        })
    }
}

struct Handle(*mut RawJournal);

// SAFETY: sd_journal objects may move between threads as long as calls are serialized,
// which the surrounding mutex guarantees.
unsafe impl Send for Handle {}

/// An open handle on the local systemd journal.
pub struct SdJournal {
    api: SdJournalApi,
    handle: Mutex<Option<Handle>>,
}

impl SdJournal {
    /// Opens the journal files of the local machine.
    pub fn open() -> Result<Self, JournalError> {
        let api = SdJournalApi::load()?;
        let mut raw = ptr::null_mut();
        // SAFETY: raw is a valid out pointer; on success libsystemd stores an owned handle.
        let r = unsafe { (api.open)(&mut raw, SD_JOURNAL_LOCAL_ONLY) };
        if r < 0 {
            return Err(JournalError::Open(r));
        }
        debug!("Opened local journal");
        Ok(Self {
            api,
            handle: Mutex::new(Some(Handle(raw))),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Handle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_handle<T>(
        &self,
        f: impl FnOnce(*mut RawJournal) -> Result<T, JournalError>,
    ) -> Result<T, JournalError> {
        let guard = self.lock();
        match guard.as_ref() {
            Some(handle) => f(handle.0),
            None => Err(JournalError::Closed),
        }
    }
}

impl LogSource for SdJournal {
    fn seek_to_time(&self, usec: u64) -> Result<(), JournalError> {
        self.with_handle(|j| {
            // SAFETY: j is a live handle, exclusively held through the mutex guard.
            let r = unsafe { (self.api.seek_realtime_usec)(j, usec) };
            if r < 0 {
                return Err(JournalError::Seek { usec, code: r });
            }
            Ok(())
        })
    }

    fn advance(&self) -> Result<AdvanceOutcome, JournalError> {
        self.with_handle(|j| {
            // SAFETY: see seek_to_time.
            let r = unsafe { (self.api.next)(j) };
            match r {
                r if r < 0 => Err(JournalError::Advance(r)),
                0 => Ok(AdvanceOutcome::NoNewEntry),
                _ => Ok(AdvanceOutcome::NewEntry),
            }
        })
    }

    fn current_record(&self) -> Result<Record, JournalError> {
        self.with_handle(|j| {
            let mut record = Record::new();
            // SAFETY: see seek_to_time. The data pointer returned by enumerate_data stays
            // valid until the next call on the handle, and is copied out before that.
            unsafe {
                (self.api.restart_data)(j);
                loop {
                    let mut data: *const c_void = ptr::null();
                    let mut length: usize = 0;
                    let r = (self.api.enumerate_data)(j, &mut data, &mut length);
                    if r == 0 {
                        break;
                    }
                    if r < 0 {
                        return Err(JournalError::Fetch(format!(
                            "failed to enumerate entry data: {r}"
                        )));
                    }
                    let bytes = std::slice::from_raw_parts(data.cast::<u8>(), length);
                    if let Some((name, value)) = parse_field(bytes) {
                        record.insert(name, value);
                    }
                }

                let mut usec: u64 = 0;
                if (self.api.get_realtime_usec)(j, &mut usec) >= 0 {
                    record.insert(REALTIME_TIMESTAMP_FIELD.to_string(), usec.to_string());
                }
            }
            Ok(record)
        })
    }

    fn wait(&self, timeout: WaitTimeout) -> WaitOutcome {
        let guard = self.lock();
        match guard.as_ref() {
            // SAFETY: see seek_to_time.
            Some(handle) => {
                WaitOutcome::from_code(unsafe { (self.api.wait)(handle.0, timeout.as_usec()) })
            }
            None => WaitOutcome::NoChange,
        }
    }

    fn close(&self) {
        let mut guard = self.lock();
        if let Some(handle) = guard.take() {
            // SAFETY: the handle is taken out of the guard, so it is closed exactly once.
            unsafe { (self.api.close)(handle.0) };
            debug!("Closed local journal");
        }
    }
}

impl Drop for SdJournal {
    fn drop(&mut self) {
        self.close();
    }
}
