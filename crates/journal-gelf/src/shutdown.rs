// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Converts SIGINT/SIGTERM into a single cancellation of the drain loop.

use derive_more::Display;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, Dispatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ShutdownSignal {
    #[display("SIGINT")]
    Interrupt,
    #[display("SIGTERM")]
    Terminate,
}

pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
    dispatch: Dispatch,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new(cancel_token: CancellationToken, dispatch: Dispatch) -> Self {
        Self {
            cancel_token,
            dispatch,
        }
    }

    /// Cancels the token on the first call. Returns whether this call cancelled it.
    pub fn trigger(&self, signal: ShutdownSignal) -> bool {
        if self.cancel_token.is_cancelled() {
            debug!("Received {signal}, shutdown already in progress");
            return false;
        }
        info!("Received {signal}, shutting down");
        self.cancel_token.cancel();
        true
    }

    /// Registers the signal handlers and listens on a background task.
    ///
    /// Handlers are installed before this returns, so a signal delivered afterwards is never
    /// lost. The task keeps listening until aborted; repeated signals are no-ops.
    #[cfg(unix)]
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let dispatch = self.dispatch.clone();

        Ok(tokio::spawn(
            async move {
                loop {
                    let signal = tokio::select! {
                        received = sigint.recv() => received.map(|()| ShutdownSignal::Interrupt),
                        received = sigterm.recv() => received.map(|()| ShutdownSignal::Terminate),
                    };
                    match signal {
                        Some(signal) => {
                            self.trigger(signal);
                        }
                        None => {
                            debug!("Signal stream closed, no longer listening");
                            break;
                        }
                    }
                }
            }
            .with_subscriber(dispatch),
        ))
    }

    #[cfg(not(unix))]
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        let dispatch = self.dispatch.clone();

        Ok(tokio::spawn(
            async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {}", e);
                        break;
                    }
                    self.trigger(ShutdownSignal::Interrupt);
                }
            }
            .with_subscriber(dispatch),
        ))
    }
}
