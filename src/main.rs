use anyhow::Result;
use lifeline::api::{AppState, RestApi};
use lifeline::config;
use lifeline::db::repositories::Repositories;
use lifeline::db::StoreService;
use lifeline::messaging::{create_notifier, NotifierTrait};
use lifeline::services::detector::ChannelTelemetrySource;
use lifeline::services::{
    DispatchService, MatchingService, SensorDetector, SensorMonitor, TrackingService,
};
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn run_app() -> Result<()> {
    // Load configuration, optionally from a file named on the command line
    let config_arg = std::env::args().nth(1);
    let config = config::load_config(config_arg.as_deref().map(Path::new))?;

    // Initialize logging; RUST_LOG overrides the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.api.log_level),
    )
    .init();

    info!("Starting Lifeline incident dispatch engine");
    info!("Configuration loaded");

    // Create the document store
    let store_service = StoreService::new_in_memory();
    if !store_service.health_check().await? {
        warn!("Document store probe failed, continuing anyway");
    }
    let store = store_service.store.clone();

    let repos = Repositories::new(store.clone());

    // Create the notifier backing all outbound messages
    let notifier = create_notifier(repos.notifications.clone());

    // Wire up the dispatch stack
    let matching = Arc::new(MatchingService::new(store.clone(), config.matching.clone()));
    let dispatch = Arc::new(DispatchService::new(
        store.clone(),
        matching.clone(),
        notifier.clone(),
        config.dispatch.clone(),
    ));
    let tracking = Arc::new(TrackingService::new(
        store.clone(),
        notifier.clone(),
        config.tracking.clone(),
        config.dispatch.cas_retry_limit,
    ));

    // Sensor pipeline: REST pushes feed the monitor channel
    let (telemetry_tx, telemetry_source) = ChannelTelemetrySource::new(256);
    let detector = Arc::new(SensorDetector::new(
        repos.detections.clone(),
        dispatch.clone(),
        notifier.clone(),
        config.detector.clone(),
    ));
    let monitor = Arc::new(SensorMonitor::new(
        telemetry_source,
        detector,
        config.detector.poll_interval_secs,
    ));

    let shutdown = CancellationToken::new();
    monitor.clone().start(shutdown.clone()).await?;
    info!("Sensor monitor started");

    // Log every notification that goes out
    notifier
        .subscribe_all(Arc::new(|notification| {
            info!(
                "[{}] to {}: {}",
                notification.kind,
                notification.recipient_id.as_deref().unwrap_or("broadcast"),
                notification.message
            );
            Ok(())
        }))
        .await?;

    // Start the REST API
    let state = AppState {
        repos,
        dispatch,
        tracking,
        matching,
        telemetry_tx,
    };
    let http_server = RestApi::new(&config.api, state)?;

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!("API server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    // Stop the sensor monitor loop
    shutdown.cancel();

    Ok(())
}

fn main() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    if let Err(e) = runtime.block_on(run_app()) {
        eprintln!("Application error: {}", e);
    }
}
