// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cursor-addressable log source abstraction.
//!
//! [`LogSource`] is the capability set the drain loop needs from the journal: seek, advance,
//! read the current entry, wait for changes and close. Implementations synchronize access to
//! their underlying handle internally, so every method takes `&self`.

#[cfg(unix)]
mod dl;
#[cfg(unix)]
pub mod sd;

use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::JournalError;

/// One journal entry as field name to field value.
pub type Record = BTreeMap<String, String>;

/// Field carrying the entry's wall-clock timestamp in microseconds, as `journalctl -o json`
/// names it.
pub const REALTIME_TIMESTAMP_FIELD: &str = "__REALTIME_TIMESTAMP";

/// `sd_journal_wait` return codes.
pub const SD_JOURNAL_NOP: i32 = 0;
pub const SD_JOURNAL_APPEND: i32 = 1;
pub const SD_JOURNAL_INVALIDATE: i32 = 2;

/// Result of advancing the read cursor by one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    NoNewEntry,
    NewEntry,
}

/// Result of a bounded wait for journal changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Timeout elapsed without changes.
    NoChange,
    /// New entries were appended.
    Appended,
    /// Journal files were added, removed or rotated.
    Invalidated,
    /// Anything else the source reported, including negative errno values.
    Unknown(i32),
}

impl WaitOutcome {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            SD_JOURNAL_NOP => WaitOutcome::NoChange,
            SD_JOURNAL_APPEND => WaitOutcome::Appended,
            SD_JOURNAL_INVALIDATE => WaitOutcome::Invalidated,
            other => WaitOutcome::Unknown(other),
        }
    }
}

/// How long a single wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    Bounded(Duration),
    Indefinite,
}

impl WaitTimeout {
    /// Timeout in microseconds as `sd_journal_wait` expects it, `u64::MAX` meaning forever.
    #[must_use]
    pub fn as_usec(&self) -> u64 {
        match self {
            WaitTimeout::Indefinite => u64::MAX,
            WaitTimeout::Bounded(timeout) => {
                // u64::MAX is reserved for the indefinite wait
                u64::try_from(timeout.as_micros())
                    .unwrap_or(u64::MAX)
                    .min(u64::MAX - 1)
            }
        }
    }
}

/// An append-only, monotonically ordered stream of structured records.
pub trait LogSource: Send + Sync + 'static {
    /// Moves the cursor to the entry closest to `usec` microseconds since the epoch.
    fn seek_to_time(&self, usec: u64) -> Result<(), JournalError>;

    /// Advances the cursor by one entry.
    fn advance(&self) -> Result<AdvanceOutcome, JournalError>;

    /// Reads all fields of the entry under the cursor.
    fn current_record(&self) -> Result<Record, JournalError>;

    /// Blocks until the source changes or the timeout elapses.
    ///
    /// Must never be called concurrently on the same source.
    fn wait(&self, timeout: WaitTimeout) -> WaitOutcome;

    /// Releases the underlying handle. Idempotent.
    fn close(&self);
}

/// Splits a raw `FIELD=value` data object. Objects without `=` are not fields.
#[must_use]
pub fn parse_field(data: &[u8]) -> Option<(String, String)> {
    let separator = data.iter().position(|&b| b == b'=')?;
    let (name, value) = data.split_at(separator);
    if name.is_empty() {
        return None;
    }
    Some((
        String::from_utf8_lossy(name).into_owned(),
        String::from_utf8_lossy(&value[1..]).into_owned(),
    ))
}
