// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Journal record to GELF 1.1 document.

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::ForwardError;
use crate::journal::{Record, REALTIME_TIMESTAMP_FIELD};

pub const GELF_VERSION: &str = "1.1";

const MESSAGE_FIELD: &str = "MESSAGE";
const HOSTNAME_FIELD: &str = "_HOSTNAME";
const PRIORITY_FIELD: &str = "PRIORITY";

const UNKNOWN_HOST: &str = "unknown";
const EMPTY_MESSAGE: &str = "-";

/// Builds the GELF JSON document for `record`.
///
/// `MESSAGE`, `_HOSTNAME`, `PRIORITY` and `__REALTIME_TIMESTAMP` map onto the GELF
/// `short_message`, `host`, `level` and `timestamp`. Every other field becomes an additional
/// field named after the journal field, lowercased, leading underscores replaced by a single
/// one. When two fields map to the same key, a trusted field (leading underscore, set by
/// journald) replaces a user field; among fields of the same kind the one sorting last wins.
pub fn encode_record(record: &Record) -> Result<Vec<u8>, ForwardError> {
    if record.is_empty() {
        return Err(ForwardError::EmptyRecord);
    }

    let mut document = Map::new();
    document.insert("version".to_string(), Value::from(GELF_VERSION));
    document.insert(
        "host".to_string(),
        Value::from(
            record
                .get(HOSTNAME_FIELD)
                .map_or(UNKNOWN_HOST, String::as_str),
        ),
    );
    document.insert(
        "short_message".to_string(),
        Value::from(record.get(MESSAGE_FIELD).map_or(EMPTY_MESSAGE, String::as_str)),
    );
    if let Some(timestamp) = record
        .get(REALTIME_TIMESTAMP_FIELD)
        .and_then(|usec| usec.parse::<u64>().ok())
    {
        document.insert(
            "timestamp".to_string(),
            Value::from(timestamp as f64 / 1_000_000.0),
        );
    }
    if let Some(level) = record
        .get(PRIORITY_FIELD)
        .and_then(|priority| priority.parse::<u8>().ok())
        .filter(|level| *level <= 7)
    {
        document.insert("level".to_string(), Value::from(level));
    }

    // user fields first, so trusted fields written by journald win a name collision
    let (trusted, user): (Vec<_>, Vec<_>) = record
        .iter()
        .filter(|(name, _)| {
            !matches!(
                name.as_str(),
                MESSAGE_FIELD | HOSTNAME_FIELD | PRIORITY_FIELD | REALTIME_TIMESTAMP_FIELD
            )
        })
        .partition(|(name, _)| name.starts_with('_'));
    for (name, value) in user.into_iter().chain(trusted) {
        let Some(key) = additional_field_name(name) else {
            continue;
        };
        if document
            .insert(key.clone(), Value::from(value.as_str()))
            .is_some()
        {
            debug!("Journal field {name} overrides an earlier field mapped to GELF {key}");
        }
    }

    Ok(serde_json::to_vec(&Value::Object(document))?)
}

/// `_SYSTEMD_UNIT` → `_systemd_unit`. `None` for names GELF reserves or cannot carry.
fn additional_field_name(name: &str) -> Option<String> {
    let trimmed = name.trim_start_matches('_');
    if trimmed.is_empty() {
        return None;
    }
    let key = format!("_{}", trimmed.to_ascii_lowercase());
    if key == "_id" {
        return None;
    }
    Some(key)
}
