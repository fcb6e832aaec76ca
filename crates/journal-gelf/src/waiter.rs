// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-flight host for the blocking journal wait.
//!
//! `sd_journal_wait` blocks its thread, so it runs on one dedicated blocking thread for the
//! lifetime of the drain loop. [`WaiterService`] owns that thread's loop and executes wait
//! commands one after another; [`Waiter`] is the drain loop's handle to it. The handle keeps
//! at most one reply outstanding: an in-flight wait whose awaiting future was dropped is
//! awaited again by the next call instead of arming a second one. Two waits can therefore
//! never run against the same source at once.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, Dispatch};

use crate::errors::WaiterError;
use crate::journal::{LogSource, WaitOutcome, WaitTimeout};

#[derive(Debug)]
pub enum WaiterCommand {
    Wait {
        timeout: WaitTimeout,
        response_tx: oneshot::Sender<WaitOutcome>,
    },
    Shutdown,
}

pub struct WaiterService<S: LogSource> {
    source: Arc<S>,
    rx: mpsc::UnboundedReceiver<WaiterCommand>,
}

impl<S: LogSource> WaiterService<S> {
    /// Runs on a blocking thread until shut down or until every handle is dropped.
    pub fn run(mut self) {
        debug!("Journal waiter started");

        while let Some(command) = self.rx.blocking_recv() {
            match command {
                WaiterCommand::Wait {
                    timeout,
                    response_tx,
                } => {
                    let outcome = self.source.wait(timeout);
                    trace!("Journal wait returned {:?}", outcome);
                    if response_tx.send(outcome).is_err() {
                        debug!("Dropping wait outcome, receiver is gone");
                    }
                }
                WaiterCommand::Shutdown => {
                    debug!("Journal waiter shutting down");
                    break;
                }
            }
        }

        debug!("Journal waiter stopped");
    }
}

/// Drain-loop side of the waiter: arm, await, retire.
pub struct Waiter {
    tx: mpsc::UnboundedSender<WaiterCommand>,
    pending: Option<oneshot::Receiver<WaitOutcome>>,
    task: JoinHandle<()>,
    timeout: WaitTimeout,
}

impl Waiter {
    /// Starts the waiter service for `source` on the blocking pool.
    ///
    /// The service logs through `dispatch`. It holds its clone of `source` until it stops.
    pub fn spawn<S: LogSource>(source: Arc<S>, timeout: WaitTimeout, dispatch: Dispatch) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = WaiterService { source, rx };
        let task = tokio::task::spawn_blocking(move || {
            tracing::dispatcher::with_default(&dispatch, || service.run());
        });

        Self {
            tx,
            pending: None,
            task,
            timeout,
        }
    }

    /// Whether a wait has been handed to the service and its outcome not yet collected.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Hands a wait to the service unless one is already outstanding.
    pub fn arm(&mut self) -> Result<(), WaiterError> {
        if self.pending.is_some() {
            return Ok(());
        }
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(WaiterCommand::Wait {
                timeout: self.timeout,
                response_tx,
            })
            .map_err(|_| WaiterError::Stopped)?;
        self.pending = Some(response_rx);
        Ok(())
    }

    /// Arms a wait if none is outstanding and resolves with its outcome.
    ///
    /// Cancel safe: dropping the future leaves the outstanding wait in place for the next
    /// call to collect.
    pub async fn outcome(&mut self) -> Result<WaitOutcome, WaiterError> {
        self.arm()?;
        let result = match self.pending.as_mut() {
            Some(pending) => pending.await,
            None => return Err(WaiterError::Stopped),
        };
        self.pending = None;
        result.map_err(|_| WaiterError::Stopped)
    }

    /// Stops the service and waits for its thread to exit, including any wait still
    /// blocking on the source. After this returns the service holds no reference to it.
    pub async fn retire(self) {
        let Waiter {
            tx, pending, task, ..
        } = self;

        // a dead service already dropped its receiver, nothing to stop
        let _ = tx.send(WaiterCommand::Shutdown);
        drop(tx);
        if let Some(pending) = pending {
            debug!("Waiting for in-flight journal wait to return");
            let _ = pending.await;
        }
        if let Err(e) = task.await {
            error!("Journal waiter task failed: {e}");
        }
    }
}
