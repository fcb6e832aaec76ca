// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory collaborators for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{ForwardError, JournalError};
use crate::forwarder::Forwarder;
use crate::journal::{AdvanceOutcome, LogSource, Record, WaitOutcome, WaitTimeout};

pub(crate) fn message(text: &str) -> Record {
    Record::from([("MESSAGE".to_string(), text.to_string())])
}

#[derive(Default)]
struct FakeState {
    entries: Vec<Record>,
    /// Index of the next entry `advance` moves onto.
    next: usize,
    current: Option<usize>,
    advance_calls: usize,
    /// 1-based `advance` call numbers that fail.
    failing_advances: HashSet<usize>,
    all_advances_fail: bool,
    /// 0-based entry indices whose fetch fails.
    failing_fetches: HashSet<usize>,
    scripted_waits: VecDeque<WaitOutcome>,
    unseen_append: bool,
    seeks: Vec<u64>,
    seek_fails: bool,
    closed: bool,
}

/// Journal double: entries live in a vector, waits block on a condvar until an append or
/// the timeout, and wait concurrency is tracked.
#[derive(Default)]
pub(crate) struct FakeJournal {
    state: Mutex<FakeState>,
    appended: Condvar,
    active_waits: AtomicUsize,
    max_concurrent_waits: AtomicUsize,
    wait_calls: AtomicUsize,
    wait_after_close: AtomicBool,
}

impl FakeJournal {
    pub(crate) fn with_entries(entries: Vec<Record>) -> Self {
        let journal = Self::default();
        journal.state.lock().unwrap().entries = entries;
        journal
    }

    pub(crate) fn append(&self, record: Record) {
        let mut state = self.state.lock().unwrap();
        state.entries.push(record);
        state.unseen_append = true;
        self.appended.notify_all();
    }

    pub(crate) fn fail_advance_call(&self, call: usize) {
        self.state.lock().unwrap().failing_advances.insert(call);
    }

    pub(crate) fn fail_every_advance(&self) {
        self.state.lock().unwrap().all_advances_fail = true;
    }

    pub(crate) fn fail_fetch_of(&self, index: usize) {
        self.state.lock().unwrap().failing_fetches.insert(index);
    }

    pub(crate) fn fail_seek(&self) {
        self.state.lock().unwrap().seek_fails = true;
    }

    /// Queues outcomes returned immediately by the next waits.
    pub(crate) fn script_waits(&self, outcomes: impl IntoIterator<Item = WaitOutcome>) {
        self.state.lock().unwrap().scripted_waits.extend(outcomes);
    }

    pub(crate) fn advance_calls(&self) -> usize {
        self.state.lock().unwrap().advance_calls
    }

    pub(crate) fn seeks(&self) -> Vec<u64> {
        self.state.lock().unwrap().seeks.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub(crate) fn wait_calls(&self) -> usize {
        self.wait_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_concurrent_waits(&self) -> usize {
        self.max_concurrent_waits.load(Ordering::SeqCst)
    }

    /// Whether a wait ever ran against a closed journal.
    pub(crate) fn waited_after_close(&self) -> bool {
        self.wait_after_close.load(Ordering::SeqCst)
    }

    fn wait_for_append(&self, timeout: WaitTimeout) -> WaitOutcome {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            self.wait_after_close.store(true, Ordering::SeqCst);
        }
        if let Some(outcome) = state.scripted_waits.pop_front() {
            return outcome;
        }
        let limit = match timeout {
            WaitTimeout::Bounded(timeout) => timeout,
            WaitTimeout::Indefinite => Duration::from_secs(3600),
        };
        let (mut state, _) = self
            .appended
            .wait_timeout_while(state, limit, |s| !s.unseen_append)
            .unwrap();
        if std::mem::take(&mut state.unseen_append) {
            WaitOutcome::Appended
        } else {
            WaitOutcome::NoChange
        }
    }
}

impl LogSource for FakeJournal {
    fn seek_to_time(&self, usec: u64) -> Result<(), JournalError> {
        let mut state = self.state.lock().unwrap();
        if state.seek_fails {
            return Err(JournalError::Seek { usec, code: -5 });
        }
        state.seeks.push(usec);
        Ok(())
    }

    fn advance(&self) -> Result<AdvanceOutcome, JournalError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(JournalError::Closed);
        }
        state.advance_calls += 1;
        if state.all_advances_fail || state.failing_advances.contains(&state.advance_calls) {
            return Err(JournalError::Advance(-74));
        }
        if state.next < state.entries.len() {
            state.current = Some(state.next);
            state.next += 1;
            Ok(AdvanceOutcome::NewEntry)
        } else {
            Ok(AdvanceOutcome::NoNewEntry)
        }
    }

    fn current_record(&self) -> Result<Record, JournalError> {
        let state = self.state.lock().unwrap();
        let index = state
            .current
            .ok_or_else(|| JournalError::Fetch("no current entry".to_string()))?;
        if state.failing_fetches.contains(&index) {
            return Err(JournalError::Fetch(format!("entry {index} is corrupt")));
        }
        Ok(state.entries[index].clone())
    }

    fn wait(&self, timeout: WaitTimeout) -> WaitOutcome {
        let active = self.active_waits.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_waits.fetch_max(active, Ordering::SeqCst);
        self.wait_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.wait_for_append(timeout);
        self.active_waits.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

/// Forwarder double recording every payload it is handed.
#[derive(Default)]
pub(crate) struct RecordingForwarder {
    sent: Mutex<Vec<Vec<u8>>>,
    /// `MESSAGE` values that fail serialization.
    unserializable: HashSet<String>,
}

impl RecordingForwarder {
    pub(crate) fn rejecting(messages: &[&str]) -> Self {
        Self {
            sent: Mutex::default(),
            unserializable: messages.iter().map(ToString::to_string).collect(),
        }
    }

    /// Payloads handed to `send`, in order, as UTF-8 message texts.
    pub(crate) fn sent_messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|payload| String::from_utf8(payload.clone()).unwrap())
            .collect()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    fn serialize(&self, record: &Record) -> Result<Vec<u8>, ForwardError> {
        let text = record.get("MESSAGE").cloned().unwrap_or_default();
        if self.unserializable.contains(&text) {
            return Err(ForwardError::EmptyRecord);
        }
        Ok(text.into_bytes())
    }

    async fn send(&self, payload: Vec<u8>) {
        self.sent.lock().unwrap().push(payload);
    }
}
