// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tail-and-forward pipeline from the local systemd journal to a GELF endpoint.
//!
//! The pieces, leaves first:
//!
//! - [`positioner`] seeks the journal cursor to "now" at startup.
//! - [`waiter`] hosts the single outstanding blocking wait on the journal.
//! - [`drain`] advances the cursor, hands each record to a [`forwarder::Forwarder`]
//!   and arms the waiter when the journal is exhausted.
//! - [`shutdown`] turns SIGINT/SIGTERM into a cancellation of the drain loop.
//!
//! [`journal::sd::SdJournal`] and [`gelf::GelfForwarder`] are the production
//! implementations of the two collaborator traits.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod drain;
pub mod errors;
pub mod forwarder;
pub mod gelf;
pub mod journal;
pub mod positioner;
pub mod shutdown;
pub mod waiter;

#[cfg(test)]
pub(crate) mod test_utils;
