// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sink the drain loop hands records to.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ForwardError;
use crate::journal::Record;

/// Accepts one record at a time and owns its delivery.
///
/// `send` is fire-and-forget from the caller's point of view: encoding onto the wire,
/// fragmentation and error reporting all happen inside the forwarder.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Converts a record into the payload `send` expects.
    fn serialize(&self, record: &Record) -> Result<Vec<u8>, ForwardError>;

    /// Best-effort delivery of a serialized record.
    async fn send(&self, payload: Vec<u8>);
}

#[async_trait]
impl<F: Forwarder + ?Sized> Forwarder for Arc<F> {
    fn serialize(&self, record: &Record) -> Result<Vec<u8>, ForwardError> {
        (**self).serialize(record)
    }

    async fn send(&self, payload: Vec<u8>) {
        (**self).send(payload).await;
    }
}
