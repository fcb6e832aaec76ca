// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! GELF over UDP.

pub mod chunk;
pub mod message;

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, error};

use crate::config::GelfConfig;
use crate::errors::ForwardError;
use crate::forwarder::Forwarder;
use crate::journal::Record;

/// Delivery counters of a [`GelfForwarder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GelfStats {
    pub sent: u64,
    pub failed: u64,
}

/// Sends zlib-compressed GELF messages to a single endpoint, chunking the ones that do not
/// fit in one datagram.
pub struct GelfForwarder {
    socket: UdpSocket,
    max_datagram: usize,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl GelfForwarder {
    /// Resolves the configured endpoint and connects a UDP socket to its first address.
    pub async fn new(config: &GelfConfig) -> Result<Self, ForwardError> {
        let endpoint = format!("{}:{}", config.host, config.port);
        let remote = tokio::net::lookup_host(&endpoint)
            .await?
            .next()
            .ok_or_else(|| ForwardError::Unresolved(endpoint.clone()))?;

        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        debug!("Forwarding GELF to {remote} ({})", config.profile);

        Ok(Self {
            socket,
            max_datagram: config.max_datagram_size(),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn stats(&self) -> GelfStats {
        GelfStats {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    async fn deliver(&self, payload: &[u8]) -> Result<(), ForwardError> {
        let datagrams = chunk::chunk(rand::random::<[u8; 8]>(), payload, self.max_datagram)?;
        for datagram in &datagrams {
            self.socket.send(datagram).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Forwarder for GelfForwarder {
    fn serialize(&self, record: &Record) -> Result<Vec<u8>, ForwardError> {
        let document = message::encode_record(record)?;
        chunk::compress(&document)
    }

    async fn send(&self, payload: Vec<u8>) {
        match self.deliver(&payload).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!("Failed to send GELF message: {e}");
            }
        }
    }
}
