use std::sync::Arc;

use clap::Parser;
use discoverd::{
    actors::{
        collector::{CollectorRegistry, SchedulerHandle},
        ingest::{IngestHandle, MergedCallback},
        publisher::PublisherHandle,
    },
    alerts::BusAlertSink,
    config::{Config, read_config_file},
    control::{ControlState, spawn_control_server},
    device::DeviceRecord,
    store::DeviceStore,
    transport::{LocalBus, Transport, topics::DEVICE_TOPIC},
};
use tracing::{Level, debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,

    /// Log level for the daemon
    #[arg(long, default_value = "trace")]
    log_level: Level,
}

const BUS_CAPACITY: usize = 1024;

fn init(level: Level) {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("discoverd", LevelFilter::from_level(level)),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };

    if let Some(discovery) = config.discovery_settings()? {
        for plugin in discovery.plugins.iter().filter(|plugin| plugin.enabled) {
            info!(
                collector = %plugin.collector,
                "scanning every {} minutes",
                plugin.auto_interval
            );
        }
    }

    let bus: Arc<dyn Transport> = Arc::new(LocalBus::new(BUS_CAPACITY));
    let publisher = PublisherHandle::spawn(bus.clone(), config.publisher.to_publisher_config());

    let store = Arc::new(
        DeviceStore::new()
            .with_tracker_limits(config.tracker.bin_interval()?, config.tracker.max_track()?),
    );

    let republisher = publisher.clone();
    let on_merged: MergedCallback = Arc::new(move |record: DeviceRecord| {
        if let Err(e) = republisher.publish_json(DEVICE_TOPIC, &record) {
            warn!("unable to encode device record: {e}");
        }
    });

    let ingest = IngestHandle::spawn(
        store.clone(),
        Arc::new(BusAlertSink::new(publisher.clone())),
        Some(on_merged),
        config.ingest_config()?,
    );
    let bridge = ingest.bridge(bus.clone());

    let registry = Arc::new(CollectorRegistry::new());
    let scheduler = SchedulerHandle::spawn(registry.clone(), config.heartbeat());

    let trimmer = spawn_data_use_trimmer(store.clone(), &config)?;

    if config.control.enabled {
        let state = ControlState::new(
            store.clone(),
            registry.clone(),
            scheduler.clone(),
            publisher.clone(),
        );
        spawn_control_server(config.control.bind_addr, state).await?;
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Err(e) = scheduler.shutdown().await {
        debug!("scheduler already stopped: {e}");
    }
    trimmer.abort();
    bridge.abort();
    ingest.shutdown().await;
    publisher.shutdown().await;

    info!(devices = store.len(), "stopped");
    Ok(())
}

/// Keep every device's data tracker within the configured window
fn spawn_data_use_trimmer(
    store: Arc<DeviceStore>,
    config: &Config,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let period = config.ingest_config()?.prune_interval;
    let window = config.tracker.max_track()?;

    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(std::time::Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            store.trim_data_use_since(window);
            trace!("trimmed data use");
        }
    }))
}
