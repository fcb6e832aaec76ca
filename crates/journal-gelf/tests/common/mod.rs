// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory journal and GELF receiver shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use flate2::read::ZlibDecoder;
use journal_gelf::errors::JournalError;
use journal_gelf::gelf::chunk::{CHUNK_HEADER_LEN, CHUNK_MAGIC};
use journal_gelf::journal::{
    AdvanceOutcome, LogSource, Record, WaitOutcome, WaitTimeout, REALTIME_TIMESTAMP_FIELD,
};
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::time::timeout;

#[derive(Default)]
struct State {
    entries: Vec<Record>,
    /// Index of the entry under the cursor, `None` before the first advance
    cursor: Option<usize>,
    /// Entries older than this are skipped by the first advance after a seek
    seeked_to: u64,
    appended_since_wait: bool,
    closed: bool,
}

/// Journal kept in memory, entries ordered by append time.
#[derive(Default)]
pub struct MemoryJournal {
    state: Mutex<State>,
    appended: Condvar,
}

impl MemoryJournal {
    pub fn append(&self, usec: u64, fields: &[(&str, &str)]) {
        let mut record: Record = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        record.insert(REALTIME_TIMESTAMP_FIELD.to_string(), usec.to_string());

        let mut state = self.state.lock().unwrap();
        state.entries.push(record);
        state.appended_since_wait = true;
        self.appended.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

fn timestamp(record: &Record) -> u64 {
    record
        .get(REALTIME_TIMESTAMP_FIELD)
        .and_then(|usec| usec.parse().ok())
        .unwrap_or(0)
}

impl LogSource for MemoryJournal {
    fn seek_to_time(&self, usec: u64) -> Result<(), JournalError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(JournalError::Closed);
        }
        state.seeked_to = usec;
        state.cursor = None;
        Ok(())
    }

    fn advance(&self) -> Result<AdvanceOutcome, JournalError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(JournalError::Closed);
        }
        let next = match state.cursor {
            Some(index) => index + 1,
            None => state
                .entries
                .iter()
                .position(|record| timestamp(record) >= state.seeked_to)
                .unwrap_or(state.entries.len()),
        };
        if next < state.entries.len() {
            state.cursor = Some(next);
            Ok(AdvanceOutcome::NewEntry)
        } else {
            Ok(AdvanceOutcome::NoNewEntry)
        }
    }

    fn current_record(&self) -> Result<Record, JournalError> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(JournalError::Closed);
        }
        state
            .cursor
            .and_then(|index| state.entries.get(index).cloned())
            .ok_or_else(|| JournalError::Fetch("no entry under the cursor".to_string()))
    }

    fn wait(&self, timeout: WaitTimeout) -> WaitOutcome {
        let limit = match timeout {
            WaitTimeout::Bounded(limit) => limit,
            WaitTimeout::Indefinite => Duration::from_secs(3600),
        };
        let state = self.state.lock().unwrap();
        let (mut state, _) = self
            .appended
            .wait_timeout_while(state, limit, |state| {
                !state.appended_since_wait && !state.closed
            })
            .unwrap();
        if std::mem::take(&mut state.appended_since_wait) {
            WaitOutcome::Appended
        } else {
            WaitOutcome::NoChange
        }
    }

    fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.appended.notify_all();
    }
}

/// UDP endpoint reassembling and decoding GELF messages.
pub struct GelfReceiver {
    socket: UdpSocket,
    partial: HashMap<[u8; 8], Vec<Option<Vec<u8>>>>,
}

impl GelfReceiver {
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind GELF receiver");
        Self {
            socket,
            partial: HashMap::new(),
        }
    }

    pub fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// Returns the next complete message and the number of datagrams it arrived in.
    pub async fn next_message(&mut self) -> (Value, usize) {
        let mut buf = vec![0u8; 65_536];
        loop {
            let len = timeout(Duration::from_secs(5), self.socket.recv(&mut buf))
                .await
                .expect("Timed out waiting for a GELF datagram")
                .unwrap();
            let datagram = &buf[..len];

            if datagram[..2] != CHUNK_MAGIC {
                return (decode(datagram), 1);
            }

            let id: [u8; 8] = datagram[2..10].try_into().unwrap();
            let sequence = datagram[10] as usize;
            let count = datagram[11] as usize;
            let parts = self.partial.entry(id).or_insert_with(|| vec![None; count]);
            parts[sequence] = Some(datagram[CHUNK_HEADER_LEN..].to_vec());

            if parts.iter().all(Option::is_some) {
                let parts = self.partial.remove(&id).unwrap();
                let payload: Vec<u8> = parts.into_iter().flatten().flatten().collect();
                return (decode(&payload), count);
            }
        }
    }

    /// Asserts nothing arrives within `quiet`.
    pub async fn expect_silence(&self, quiet: Duration) {
        let mut buf = vec![0u8; 65_536];
        let received = timeout(quiet, self.socket.recv(&mut buf)).await;
        assert!(received.is_err(), "Unexpected GELF datagram");
    }
}

fn decode(payload: &[u8]) -> Value {
    let mut json = String::new();
    ZlibDecoder::new(payload)
        .read_to_string(&mut json)
        .expect("GELF payload is not zlib compressed");
    serde_json::from_str(&json).expect("GELF payload is not JSON")
}
