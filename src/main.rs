//! SenML telemetry pipeline - Main Entry Point
//!
//! One binary, three long-running roles: a simulated `sensor`, the persisting
//! `broker` ingest path and a `monitor` that decodes and logs live traffic.

use clap::{Args, Parser, Subcommand};
use senml_pipeline::broker::{BrokerRouter, RouterOptions};
use senml_pipeline::config::PipelineConfig;
use senml_pipeline::monitor::TelemetryMonitor;
use senml_pipeline::observability::{init_logging, LogSettings};
use senml_pipeline::sensor::{validate, SensorDraft, SensorSimulator, ValueRange};
use senml_pipeline::storage::{DocumentStore, StoreBackend};
use senml_pipeline::transport::mqtt::MqttClient;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// SenML telemetry pipeline
#[derive(Parser)]
#[command(name = "senml-pipeline")]
#[command(about = "Simulated SenML sensors, MQTT routing and document persistence")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Override `mqtt.broker_url`
    #[arg(long, env = "MQTT_BROKER_URL", global = true)]
    broker_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish simulated readings on a fixed period
    Sensor(SensorArgs),
    /// Persist allow-listed topics into the document store
    Broker,
    /// Decode and log telemetry on every configured topic
    Monitor,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

/// Sensor setup; each flag overrides the `[sensor]` config section
#[derive(Args)]
struct SensorArgs {
    #[arg(long)]
    name: Option<String>,

    /// Topic to publish on; must be listed in `[topics]`
    #[arg(long)]
    topic: Option<String>,

    /// SenML unit symbol, e.g. Cel
    #[arg(long)]
    unit: Option<String>,

    /// senml+json, senml+xml or senml+exi
    #[arg(long)]
    format: Option<String>,

    /// Publish period in milliseconds
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&LogSettings::from_env().with_verbosity(cli.verbose));

    info!(version = env!("CARGO_PKG_VERSION"), "Starting senml-pipeline");

    let config = match load_configuration(cli.config.as_deref(), cli.broker_url) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Sensor(args) => run_sensor(config, args).await,
        Commands::Broker => run_broker(config).await,
        Commands::Monitor => run_monitor(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: Option<&Path>,
    broker_url: Option<String>,
) -> CliResult<PipelineConfig> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => ["pipeline.toml", "config/pipeline.toml"]
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
            .ok_or("no configuration file found; pass -c/--config or create pipeline.toml")?,
    };

    info!(path = %path.display(), "Loading configuration");
    let mut config = PipelineConfig::load_from_file(&path)?;

    if let Some(url) = broker_url {
        info!(broker_url = %url, "Broker URL overridden");
        config.mqtt.broker_url = url;
        config.validate()?;
    }

    Ok(config)
}

async fn run_sensor(config: PipelineConfig, args: SensorArgs) -> CliResult<()> {
    let draft = SensorDraft::from_section(&config.sensor).with_overrides(
        args.name,
        args.topic,
        args.unit,
        args.format,
    );
    let sensor = validate(&draft, &config.topics)?;
    let range = ValueRange::from_section(&config.sensor)?;
    let period = Duration::from_millis(
        args.interval_ms
            .unwrap_or(config.sensor.publish_interval_ms)
            .max(1),
    );

    let mut transport = MqttClient::new(sensor.name(), config.mqtt.clone())?;
    transport.connect().await?;
    let transport = Arc::new(transport);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let simulator = SensorSimulator::new(sensor, range, period, transport.clone());
    let sensor_task = tokio::spawn(async move { simulator.run(shutdown_rx).await });

    wait_for_shutdown(&transport).await;

    let _ = shutdown_tx.send(true);
    sensor_task.await?;

    match Arc::try_unwrap(transport) {
        Ok(mut transport) => transport.disconnect().await?,
        Err(_) => warn!("Transport still shared at shutdown; dropping connection"),
    }
    Ok(())
}

async fn run_broker(config: PipelineConfig) -> CliResult<()> {
    let database_url = config.get_database_url()?;
    let store = Arc::new(StoreBackend::connect(&database_url).await?);
    info!(store = %store.describe(), "Document store ready");

    let router = Arc::new(BrokerRouter::new(store, RouterOptions::from_config(&config)));

    let (inbound_tx, inbound_rx) = mpsc::channel(config.broker.inbound_buffer.max(1));
    let mut transport = MqttClient::new("broker", config.mqtt.clone())?;
    transport.set_message_sender(inbound_tx).await;
    transport.connect().await?;
    transport.subscribe(&config.broker.subscription).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router_task = {
        let router = router.clone();
        tokio::spawn(async move { router.run(inbound_rx, shutdown_rx).await })
    };

    wait_for_shutdown(&transport).await;

    let _ = shutdown_tx.send(true);
    router_task.await?;
    router.shutdown().await;

    transport.disconnect().await?;
    Ok(())
}

async fn run_monitor(config: PipelineConfig) -> CliResult<()> {
    let (inbound_tx, inbound_rx) = mpsc::channel(config.broker.inbound_buffer.max(1));
    let mut transport = MqttClient::new("monitor", config.mqtt.clone())?;
    transport.set_message_sender(inbound_tx).await;
    transport.connect().await?;
    for topic in config.topics.publishable() {
        transport.subscribe(&topic).await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = Arc::new(TelemetryMonitor::new());
    let monitor_task = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.run(inbound_rx, shutdown_rx).await })
    };

    wait_for_shutdown(&transport).await;

    let _ = shutdown_tx.send(true);
    monitor_task.await?;
    transport.disconnect().await?;
    Ok(())
}

fn handle_config_command(config: &PipelineConfig, show: bool) -> CliResult<()> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Wait for SIGINT, SIGTERM or permanent loss of the broker connection
async fn wait_for_shutdown(transport: &MqttClient) {
    let signals = async {
        match (
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
            signal::unix::signal(signal::unix::SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                }
            }
            _ => {
                warn!("Unix signal handlers unavailable; falling back to ctrl-c");
                if let Err(e) = signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for ctrl-c");
                }
            }
        }
    };

    tokio::select! {
        _ = signals => {}
        _ = monitor_connection_health(transport) => {
            error!("MQTT connection permanently lost, shutting down");
        }
    }
}

async fn monitor_connection_health(transport: &MqttClient) {
    loop {
        if transport.is_permanently_disconnected() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
}
