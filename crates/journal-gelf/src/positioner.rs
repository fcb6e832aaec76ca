// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Startup positioning of the journal cursor.
//!
//! Only entries appended after the process starts are forwarded; there is no checkpoint to
//! resume from, so every start seeks to the current wall-clock time.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::JournalError;
use crate::journal::LogSource;

/// Seeks `source` to the current time. Returns the position in microseconds.
pub fn position_at_now<S: LogSource + ?Sized>(source: &S) -> Result<u64, JournalError> {
    position_at(source, SystemTime::now())
}

/// Seeks `source` to `at`. Returns the position in microseconds since the epoch.
pub fn position_at<S: LogSource + ?Sized>(
    source: &S,
    at: SystemTime,
) -> Result<u64, JournalError> {
    let usec = at
        .duration_since(UNIX_EPOCH)
        .map_err(|e| JournalError::Clock(e.to_string()))?
        .as_micros();
    let usec = u64::try_from(usec).map_err(|e| JournalError::Clock(e.to_string()))?;
    source.seek_to_time(usec)?;
    Ok(usec)
}
