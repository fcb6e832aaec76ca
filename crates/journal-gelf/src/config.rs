// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;
use std::time::Duration;

use derive_more::Display;
use tracing::level_filters::LevelFilter;

use crate::errors::ConfigError;
use crate::gelf::chunk::CHUNK_HEADER_LEN;

pub const DEFAULT_GELF_HOST: &str = "127.0.0.1";
pub const DEFAULT_GELF_PORT: u16 = 12201;
pub const DEFAULT_MAX_CHUNK_SIZE_WAN: usize = 1420;
pub const DEFAULT_MAX_CHUNK_SIZE_LAN: usize = 8154;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 1000;

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Network profile deciding the maximum datagram size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum TransportProfile {
    #[default]
    #[display("wan")]
    Wan,
    #[display("lan")]
    Lan,
}

impl FromStr for TransportProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wan" => Ok(TransportProfile::Wan),
            "lan" => Ok(TransportProfile::Lan),
            _ => Err(ConfigError::InvalidConnection(s.to_string())),
        }
    }
}

/// Where and how GELF datagrams are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GelfConfig {
    pub host: String,
    pub port: u16,
    pub profile: TransportProfile,
    /// Maximum datagram size, chunk header included, on the wan profile
    pub max_chunk_size_wan: usize,
    /// Maximum datagram size, chunk header included, on the lan profile
    pub max_chunk_size_lan: usize,
}

impl Default for GelfConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_GELF_HOST.to_string(),
            port: DEFAULT_GELF_PORT,
            profile: TransportProfile::default(),
            max_chunk_size_wan: DEFAULT_MAX_CHUNK_SIZE_WAN,
            max_chunk_size_lan: DEFAULT_MAX_CHUNK_SIZE_LAN,
        }
    }
}

impl GelfConfig {
    /// Maximum datagram size of the active profile.
    #[must_use]
    pub fn max_datagram_size(&self) -> usize {
        match self.profile {
            TransportProfile::Wan => self.max_chunk_size_wan,
            TransportProfile::Lan => self.max_chunk_size_lan,
        }
    }

    /// Checks both profiles' sizes leave room for chunk payload and fit in a UDP datagram.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (profile, size) in [
            (TransportProfile::Wan, self.max_chunk_size_wan),
            (TransportProfile::Lan, self.max_chunk_size_lan),
        ] {
            if size <= CHUNK_HEADER_LEN || size > MAX_UDP_PAYLOAD {
                return Err(ConfigError::InvalidChunkSize {
                    profile: profile.to_string(),
                    size,
                    min: CHUNK_HEADER_LEN + 1,
                    max: MAX_UDP_PAYLOAD,
                });
            }
        }
        Ok(())
    }
}

/// Parses a wait timeout given in milliseconds.
pub fn parse_wait_timeout(millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 {
        return Err(ConfigError::InvalidWaitTimeout);
    }
    Ok(Duration::from_millis(millis))
}

/// Parses a diagnostic verbosity name.
///
/// Accepts the tracing level names plus `warning`, and maps `fatal`/`panic` to `error`.
pub fn parse_log_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "fatal" | "panic" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}
