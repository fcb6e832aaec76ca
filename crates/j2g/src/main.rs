// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, Dispatch};
use tracing_subscriber::EnvFilter;

use journal_gelf::{
    config::{
        parse_log_level, parse_wait_timeout, GelfConfig, TransportProfile, DEFAULT_GELF_HOST,
        DEFAULT_GELF_PORT, DEFAULT_MAX_CHUNK_SIZE_LAN, DEFAULT_MAX_CHUNK_SIZE_WAN,
        DEFAULT_WAIT_TIMEOUT_MS,
    },
    drain::{DrainLoop, DrainReport},
    errors::{ConfigError, ForwardError, JournalError, WaiterError},
    gelf::GelfForwarder,
    journal::sd::SdJournal,
    positioner::position_at_now,
    shutdown::ShutdownCoordinator,
};

/// Forwards new systemd journal entries to a GELF endpoint.
#[derive(Debug, Parser)]
#[command(name = "j2g", version, about)]
struct Args {
    /// Diagnostic verbosity: trace, debug, info, warning or error
    #[arg(long, env = "J2G_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// GELF endpoint host name or address
    #[arg(long, env = "J2G_GELF_HOST", default_value = DEFAULT_GELF_HOST)]
    gelf_host: String,

    /// GELF endpoint UDP port
    #[arg(long, env = "J2G_GELF_PORT", default_value_t = DEFAULT_GELF_PORT)]
    gelf_port: u16,

    /// Network profile selecting the maximum datagram size: wan or lan
    #[arg(long, env = "J2G_GELF_CONNECTION", default_value = "wan")]
    gelf_connection: String,

    /// Maximum datagram size on the wan profile, chunk header included
    #[arg(long, env = "J2G_GELF_MAX_CHUNK_SIZE_WAN", default_value_t = DEFAULT_MAX_CHUNK_SIZE_WAN)]
    gelf_max_chunk_size_wan: usize,

    /// Maximum datagram size on the lan profile, chunk header included
    #[arg(long, env = "J2G_GELF_MAX_CHUNK_SIZE_LAN", default_value_t = DEFAULT_MAX_CHUNK_SIZE_LAN)]
    gelf_max_chunk_size_lan: usize,

    /// Upper bound of a single journal wait, and so of the shutdown latency
    #[arg(long, env = "J2G_WAIT_TIMEOUT_MS", default_value_t = DEFAULT_WAIT_TIMEOUT_MS)]
    wait_timeout_ms: u64,
}

impl Args {
    fn gelf_config(&self) -> Result<GelfConfig, ConfigError> {
        let config = GelfConfig {
            host: self.gelf_host.clone(),
            port: self.gelf_port,
            profile: self.gelf_connection.parse::<TransportProfile>()?,
            max_chunk_size_wan: self.gelf_max_chunk_size_wan,
            max_chunk_size_lan: self.gelf_max_chunk_size_lan,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Error)]
enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("failed to set up GELF forwarder: {0}")]
    Forwarder(#[from] ForwardError),
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
    #[error(transparent)]
    Waiter(#[from] WaiterError),
}

fn build_dispatch(level: LevelFilter) -> Dispatch {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::default().add_directive(level.into()))
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();
    Dispatch::new(subscriber)
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match parse_log_level(&args.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("j2g: {e}");
            return ExitCode::FAILURE;
        }
    };
    let dispatch = build_dispatch(level);

    start(args, dispatch.clone()).with_subscriber(dispatch).await
}

async fn start(args: Args, dispatch: Dispatch) -> ExitCode {
    debug!("Logging subsystem enabled");
    match run(args, dispatch).await {
        Ok(report) => {
            info!(
                forwarded = report.forwarded,
                dropped = report.dropped,
                "j2g stopped"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, dispatch: Dispatch) -> Result<DrainReport, StartupError> {
    let gelf_config = args.gelf_config()?;
    let wait_timeout = parse_wait_timeout(args.wait_timeout_ms)?;

    let journal = Arc::new(SdJournal::open()?);
    let usec = position_at_now(journal.as_ref())?;
    debug!("Journal cursor positioned at {usec}");

    let forwarder = Arc::new(GelfForwarder::new(&gelf_config).await?);
    info!(
        "Forwarding journal to {}:{} over {}",
        gelf_config.host, gelf_config.port, gelf_config.profile
    );

    let cancel_token = CancellationToken::new();
    let signals = ShutdownCoordinator::new(cancel_token.clone(), dispatch.clone())
        .spawn()
        .map_err(StartupError::Signals)?;

    let result = DrainLoop::new(
        journal,
        Arc::clone(&forwarder),
        cancel_token,
        wait_timeout,
        dispatch,
    )
    .run()
    .await;
    signals.abort();

    let stats = forwarder.stats();
    debug!(sent = stats.sent, failed = stats.failed, "GELF delivery");
    Ok(result?)
}
