// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tail-and-forward event loop.
//!
//! The loop drains every entry appended after the cursor, hands each one to the
//! [`Forwarder`] in cursor order, and once the journal is exhausted parks on a single bounded
//! wait raced against the cancellation token:
//!
//! ```text
//!            NoNewEntry                 Appended / Invalidated
//!   Draining ──────────────► Waiting ───────────────────────► Draining
//!                             │   ▲
//!                             │   └── NoChange / Unknown
//!                             │
//!                             └── cancelled ──► ShuttingDown
//! ```
//!
//! Per-entry failures (advance, fetch, serialize) are logged and the entry is dropped; they
//! never stop the loop. Cancellation is checked before each wait and after each advance, never
//! in the middle of a record, so a journal that keeps growing cannot hold the loop in
//! `Draining`. Shutdown completes within one wait timeout: the in-flight wait is never aborted,
//! it is allowed to return before the journal is closed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn, Dispatch};

use crate::errors::WaiterError;
use crate::forwarder::Forwarder;
use crate::journal::{AdvanceOutcome, LogSource, WaitOutcome, WaitTimeout};
use crate::waiter::Waiter;

/// Entries handled between two yields to the runtime while draining.
pub const DRAIN_YIELD_INTERVAL: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Draining,
    Waiting,
    ShuttingDown,
}

/// What a drain loop run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Records handed to the forwarder.
    pub forwarded: u64,
    /// Entries skipped because they could not be read or serialized.
    pub dropped: u64,
    /// Failed cursor advances.
    pub advance_errors: u64,
    /// Waits that completed with an outcome.
    pub wait_cycles: u64,
}

pub struct DrainLoop<S: LogSource, F: Forwarder> {
    source: Arc<S>,
    forwarder: F,
    cancel_token: CancellationToken,
    wait_timeout: Duration,
    dispatch: Dispatch,
    report: DrainReport,
}

impl<S: LogSource, F: Forwarder> DrainLoop<S, F> {
    /// Creates a drain loop over an already positioned `source`.
    ///
    /// All logging of the loop and its waiter goes through `dispatch`.
    #[must_use]
    pub fn new(
        source: Arc<S>,
        forwarder: F,
        cancel_token: CancellationToken,
        wait_timeout: Duration,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            source,
            forwarder,
            cancel_token,
            wait_timeout,
            dispatch,
            report: DrainReport::default(),
        }
    }

    /// Runs until the cancellation token fires, then closes the source.
    ///
    /// Fails only if the waiter service dies underneath the loop; the source is closed in
    /// that case too.
    pub async fn run(self) -> Result<DrainReport, WaiterError> {
        let dispatch = self.dispatch.clone();
        self.spin().with_subscriber(dispatch).await
    }

    async fn spin(mut self) -> Result<DrainReport, WaiterError> {
        let mut waiter = Waiter::spawn(
            Arc::clone(&self.source),
            WaitTimeout::Bounded(self.wait_timeout),
            self.dispatch.clone(),
        );
        let mut failure = None;
        let mut state = DrainState::Draining;

        info!("Starting journal drain loop");
        while state != DrainState::ShuttingDown {
            state = match state {
                DrainState::Draining => self.drain().await,
                DrainState::Waiting => match self.wait(&mut waiter).await {
                    Ok(next) => next,
                    Err(e) => {
                        error!("Stopping drain loop: {e}");
                        failure = Some(e);
                        DrainState::ShuttingDown
                    }
                },
                DrainState::ShuttingDown => DrainState::ShuttingDown,
            };
        }

        info!("Closing journal");
        waiter.retire().await;
        self.source.close();
        info!(
            forwarded = self.report.forwarded,
            dropped = self.report.dropped,
            advance_errors = self.report.advance_errors,
            "Journal drain loop stopped"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(self.report),
        }
    }

    /// Forwards entries until the journal has nothing new.
    async fn drain(&mut self) -> DrainState {
        let mut handled: u64 = 0;
        loop {
            match self.source.advance() {
                Ok(AdvanceOutcome::NewEntry) => self.forward_current().await,
                Ok(AdvanceOutcome::NoNewEntry) => return DrainState::Waiting,
                Err(e) => {
                    self.report.advance_errors += 1;
                    error!("Journal traversing error: {e}");
                }
            }
            if self.cancel_token.is_cancelled() {
                debug!("Cancellation received while draining, leaving unread entries");
                return DrainState::ShuttingDown;
            }
            handled += 1;
            if handled % DRAIN_YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
        }
    }

    async fn forward_current(&mut self) {
        let record = match self.source.current_record() {
            Ok(record) => record,
            Err(e) => {
                self.report.dropped += 1;
                warn!("Skipping unreadable entry: {e}");
                return;
            }
        };
        debug!("Received entry: {:?}", record);

        let payload = match self.forwarder.serialize(&record) {
            Ok(payload) => payload,
            Err(e) => {
                self.report.dropped += 1;
                error!("Skipping unserializable entry: {e}");
                return;
            }
        };
        self.forwarder.send(payload).await;
        self.report.forwarded += 1;
    }

    /// Races one journal wait against cancellation.
    async fn wait(&mut self, waiter: &mut Waiter) -> Result<DrainState, WaiterError> {
        if self.cancel_token.is_cancelled() {
            return Ok(DrainState::ShuttingDown);
        }

        let outcome = tokio::select! {
            () = self.cancel_token.cancelled() => {
                debug!("Cancellation received while waiting for journal changes");
                return Ok(DrainState::ShuttingDown);
            }
            outcome = waiter.outcome() => outcome?,
        };
        self.report.wait_cycles += 1;

        Ok(match outcome {
            WaitOutcome::Appended => DrainState::Draining,
            WaitOutcome::NoChange => DrainState::Waiting,
            WaitOutcome::Invalidated => {
                warn!("Journal files were rotated or invalidated, resynchronizing");
                DrainState::Draining
            }
            WaitOutcome::Unknown(code) => {
                warn!("Received unknown journal event: {code}");
                DrainState::Waiting
            }
        })
    }
}
