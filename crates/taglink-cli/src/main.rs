//! `taglink` service binary.
//!
//! Wires the store, the pipeline and the subscriber server together, then
//! runs until Ctrl-C.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use taglink_core::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_SIMULATION_INTERVAL_MS,
};
use taglink_core::{NormalizerConfig, TimestampUnit};
use taglink_hardware::{DefaultDriverFactory, LlrpConfig, SimulatedConfig};
use taglink_network::{SubscriberServer, TransportConfig};
use taglink_pipeline::{DEFAULT_MAX_SUBSCRIBERS, PipelineConfig, PipelineContext, UnknownIdentityPolicy};
use taglink_storage::{AnyTagStore, Database, DatabaseConfig, MemoryTagStore, SqliteTagStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "taglink", version, about = "RFID reader event ingestion and broadcast service")]
struct Args {
    /// Address subscribers connect to
    #[arg(long, env = "TAGLINK_BIND", default_value = "0.0.0.0:8765")]
    bind: SocketAddr,

    /// SQLite database file; tag state is kept in memory when omitted
    #[arg(long, env = "TAGLINK_DATABASE", value_name = "PATH")]
    database: Option<String>,

    /// Reader to connect to at startup (`host` or `host:port`)
    #[arg(long, env = "TAGLINK_READER", value_name = "ADDR")]
    reader: Option<String>,

    /// Start the simulated reader at startup
    #[arg(long, env = "TAGLINK_SIMULATE")]
    simulate: bool,

    /// Interval between simulated batches
    #[arg(long, env = "TAGLINK_SIMULATION_INTERVAL_MS", default_value_t = DEFAULT_SIMULATION_INTERVAL_MS)]
    simulation_interval_ms: u64,

    /// Events held before the oldest is dropped
    #[arg(long, env = "TAGLINK_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Bounded wait for a reader connect
    #[arg(long, env = "TAGLINK_CONNECT_TIMEOUT_MS", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    connect_timeout_ms: u64,

    #[arg(long, env = "TAGLINK_MAX_SUBSCRIBERS", default_value_t = DEFAULT_MAX_SUBSCRIBERS)]
    max_subscribers: usize,

    /// Unit of raw reader timestamps
    #[arg(long, env = "TAGLINK_TIMESTAMP_UNIT", value_enum, default_value_t = TimestampUnitArg::Auto)]
    timestamp_unit: TimestampUnitArg,

    /// What to do with readings that carry no identity
    #[arg(long, env = "TAGLINK_UNKNOWN_IDENTITY", value_enum, default_value_t = UnknownIdentityArg::BroadcastOnly)]
    unknown_identity: UnknownIdentityArg,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "TAGLINK_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TimestampUnitArg {
    /// Guess from the magnitude of each value
    Auto,
    #[value(alias = "s")]
    Seconds,
    #[value(alias = "ms")]
    Millis,
    #[value(alias = "us")]
    Micros,
}

impl From<TimestampUnitArg> for TimestampUnit {
    fn from(arg: TimestampUnitArg) -> Self {
        match arg {
            TimestampUnitArg::Auto => TimestampUnit::Auto,
            TimestampUnitArg::Seconds => TimestampUnit::Seconds,
            TimestampUnitArg::Millis => TimestampUnit::Millis,
            TimestampUnitArg::Micros => TimestampUnit::Micros,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum UnknownIdentityArg {
    /// Broadcast as "N/A", never store
    BroadcastOnly,
    /// Drop the reading
    Skip,
    /// Store under "N/A" and broadcast
    StoreAsSentinel,
}

impl From<UnknownIdentityArg> for UnknownIdentityPolicy {
    fn from(arg: UnknownIdentityArg) -> Self {
        match arg {
            UnknownIdentityArg::BroadcastOnly => UnknownIdentityPolicy::BroadcastOnly,
            UnknownIdentityArg::Skip => UnknownIdentityPolicy::Skip,
            UnknownIdentityArg::StoreAsSentinel => UnknownIdentityPolicy::StoreAsSentinel,
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

async fn open_store(path: Option<&str>) -> anyhow::Result<AnyTagStore> {
    match path {
        Some(path) => {
            let db = Database::new(DatabaseConfig::new(path))
                .await
                .with_context(|| format!("opening database {path}"))?;
            info!("Tag state stored in {}", path);
            Ok(SqliteTagStore::new(db.pool().clone()).into())
        }
        None => {
            warn!("No database configured, tag state is kept in memory");
            Ok(MemoryTagStore::new().into())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!("taglink {} starting", taglink_core::VERSION);

    let store = open_store(args.database.as_deref()).await?;

    let factory = DefaultDriverFactory::new(
        SimulatedConfig::default().interval(Duration::from_millis(args.simulation_interval_ms)),
        LlrpConfig::default().connect_timeout(Duration::from_millis(args.connect_timeout_ms)),
    );
    let config = PipelineConfig::default()
        .queue_capacity(args.queue_capacity)
        .max_subscribers(args.max_subscribers)
        .connect_timeout(Duration::from_millis(args.connect_timeout_ms))
        .normalizer(NormalizerConfig::default().timestamp_unit(args.timestamp_unit.into()))
        .unknown_identity(args.unknown_identity.into());

    let context = PipelineContext::new(config, store, Arc::new(factory));
    context.start();

    let cancel = CancellationToken::new();
    let server = SubscriberServer::bind(
        TransportConfig::default().bind_addr(args.bind),
        context.hub().clone(),
    )
    .await?;
    let server_task = server.spawn(cancel.clone());

    if args.simulate || args.reader.is_some() {
        let address = args.reader.as_deref().unwrap_or("simulated");
        let response = context.request_connect(address, args.simulate).await;
        if response.is_success() {
            info!("{}", response.message);
        } else {
            error!("Startup connect failed: {}", response.message);
        }
    }

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutting down");

    cancel.cancel();
    context.shutdown().await?;
    match server_task.await {
        Ok(result) => result?,
        Err(e) => warn!("Subscriber server task ended abnormally: {}", e),
    }

    let status = context.status();
    info!(
        broadcast = status.hub.events_broadcast,
        dropped = status.queue_dropped,
        "taglink stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["taglink"]).unwrap();
        assert_eq!(args.bind.to_string(), "0.0.0.0:8765");
        assert_eq!(TimestampUnit::from(args.timestamp_unit), TimestampUnit::Auto);
        assert_eq!(
            UnknownIdentityPolicy::from(args.unknown_identity),
            UnknownIdentityPolicy::BroadcastOnly
        );
        assert!(args.database.is_none());
        assert!(!args.simulate);
    }

    #[test]
    fn test_enum_flags() {
        let args = Args::try_parse_from([
            "taglink",
            "--timestamp-unit",
            "ms",
            "--unknown-identity",
            "store-as-sentinel",
        ])
        .unwrap();
        assert_eq!(TimestampUnit::from(args.timestamp_unit), TimestampUnit::Millis);
        assert_eq!(
            UnknownIdentityPolicy::from(args.unknown_identity),
            UnknownIdentityPolicy::StoreAsSentinel
        );

        let args = Args::try_parse_from(["taglink", "--timestamp-unit", "seconds"]).unwrap();
        assert_eq!(TimestampUnit::from(args.timestamp_unit), TimestampUnit::Seconds);

        assert!(Args::try_parse_from(["taglink", "--timestamp-unit", "hours"]).is_err());
        assert!(Args::try_parse_from(["taglink", "--unknown-identity", "maybe"]).is_err());
    }
}
