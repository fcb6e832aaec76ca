// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors raised by a [`crate::journal::LogSource`].
///
/// Negative codes are the errno values reported by libsystemd.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to load libsystemd: {0}")]
    Library(String),
    #[error("failed to open journal: {0}")]
    Open(i32),
    #[error("system clock is before the unix epoch: {0}")]
    Clock(String),
    #[error("failed to seek to {usec}: {code}")]
    Seek { usec: u64, code: i32 },
    #[error("failed to iterate journal: {0}")]
    Advance(i32),
    #[error("failed to read journal entry: {0}")]
    Fetch(String),
    #[error("journal is closed")]
    Closed,
}

/// Errors raised while turning a record into datagrams.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("record has no fields")]
    EmptyRecord,
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to compress record: {0}")]
    Compress(#[source] std::io::Error),
    #[error("message needs {chunks} chunks, at most {max} are allowed")]
    TooManyChunks { chunks: usize, max: usize },
    #[error("datagram size {0} leaves no room for chunk payload")]
    DatagramTooSmall(usize),
    #[error("gelf endpoint {0} did not resolve to any address")]
    Unresolved(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Invalid command line or environment configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown log level '{0}', expected one of trace, debug, info, warning, error")]
    InvalidLogLevel(String),
    #[error("unknown gelf connection '{0}', expected wan or lan")]
    InvalidConnection(String),
    #[error("max chunk size {size} for {profile} must be between {min} and {max}")]
    InvalidChunkSize {
        profile: String,
        size: usize,
        min: usize,
        max: usize,
    },
    #[error("wait timeout must be greater than zero")]
    InvalidWaitTimeout,
}

/// The waiter service went away while the drain loop still needed it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaiterError {
    #[error("journal waiter stopped unexpectedly")]
    Stopped,
}
