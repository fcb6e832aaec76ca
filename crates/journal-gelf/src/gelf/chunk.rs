// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! GELF compression and UDP chunking.
//!
//! A payload larger than one datagram is split into chunks, each prefixed with
//! `0x1e 0x0f`, an 8-byte message id, its sequence number and the sequence count. Graylog
//! reassembles at most 128 chunks per message.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::errors::ForwardError;

pub const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];
pub const CHUNK_HEADER_LEN: usize = 12;
pub const MAX_CHUNKS: usize = 128;

pub fn compress(payload: &[u8]) -> Result<Vec<u8>, ForwardError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).map_err(ForwardError::Compress)?;
    encoder.finish().map_err(ForwardError::Compress)
}

/// Splits `payload` into datagrams of at most `max_datagram` bytes.
///
/// A payload that fits is returned as the single, unchunked datagram.
pub fn chunk(
    message_id: [u8; 8],
    payload: &[u8],
    max_datagram: usize,
) -> Result<Vec<Vec<u8>>, ForwardError> {
    if payload.len() <= max_datagram {
        return Ok(vec![payload.to_vec()]);
    }
    if max_datagram <= CHUNK_HEADER_LEN {
        return Err(ForwardError::DatagramTooSmall(max_datagram));
    }

    let chunk_len = max_datagram - CHUNK_HEADER_LEN;
    let count = payload.len().div_ceil(chunk_len);
    if count > MAX_CHUNKS {
        return Err(ForwardError::TooManyChunks {
            chunks: count,
            max: MAX_CHUNKS,
        });
    }

    Ok(payload
        .chunks(chunk_len)
        .enumerate()
        .map(|(sequence, part)| {
            let mut datagram = Vec::with_capacity(CHUNK_HEADER_LEN + part.len());
            datagram.extend_from_slice(&CHUNK_MAGIC);
            datagram.extend_from_slice(&message_id);
            // both fit in a byte, count is at most MAX_CHUNKS
            datagram.push(sequence as u8);
            datagram.push(count as u8);
            datagram.extend_from_slice(part);
            datagram
        })
        .collect())
}
