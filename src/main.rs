use clap::Parser;
use tracing_subscriber::EnvFilter;

use mqtt_db_logger::config::LoggerConfig;
use mqtt_db_logger::transport::{NullBus, NullRpc};
use mqtt_db_logger::Engine;

/// MQTT-style telemetry logger: subscribes to configured topic patterns,
/// persists samples to a single SQLite file, and answers historical range
/// queries over RPC.
#[derive(Parser, Debug)]
#[command(name = "mqtt-db-logger")]
struct Args {
    /// Path to the JSON config file describing the database location and
    /// logging groups.
    #[arg(short = 'c', long = "config")]
    config: String,

    /// Broker host to connect to.
    #[arg(short = 'H', long = "host", default_value = "localhost")]
    host: String,

    /// Broker port to connect to.
    #[arg(short = 'p', long = "port", default_value_t = 1883)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mqtt_db_logger=info")))
        .init();

    let args = Args::parse();

    let config = LoggerConfig::load(&args.config)?;
    tracing::info!(database = %config.database, groups = config.groups.len(), "opening store");

    let mut engine = Engine::open(&config.database, config.groups)?;

    // The pub/sub bus and RPC transport are supplied by the surrounding
    // integration; this binary only wires the engine to the seam traits.
    // `NullBus`/`NullRpc` stand in until a real transport is attached.
    let mut bus = NullBus::default();
    let mut rpc = NullRpc::default();
    engine.start(&mut bus, &mut rpc)?;

    tracing::info!(host = %args.host, port = args.port, "engine ready, waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    Ok(())
}
