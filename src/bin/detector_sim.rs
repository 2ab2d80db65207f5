use anyhow::Result;
use chrono::Utc;
use lifeline::config::{DetectorConfig, DispatchConfig, MatchingConfig};
use lifeline::db::memory::MemoryStore;
use lifeline::db::models::detection_models::{Axes, RawTelemetry};
use lifeline::db::models::hospital_models::NewHospital;
use lifeline::db::repositories::Repositories;
use lifeline::geo::Coordinate;
use lifeline::messaging::create_notifier;
use lifeline::services::detector::{ChannelTelemetrySource, SensorDetector, SensorMonitor};
use lifeline::services::{DispatchService, MatchingService};
use log::{error, info};
use rand::Rng;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting detector simulation");

    let store = MemoryStore::shared();
    let repos = Repositories::new(store.clone());
    let notifier = create_notifier(repos.notifications.clone());

    let matching = Arc::new(MatchingService::new(
        store.clone(),
        MatchingConfig::default(),
    ));
    let dispatch = Arc::new(DispatchService::new(
        store.clone(),
        matching,
        notifier.clone(),
        DispatchConfig::default(),
    ));

    // One hospital close to the simulated vehicle
    repos
        .hospitals
        .create(NewHospital {
            name: "City General".to_string(),
            location: Coordinate::new(19.0033, 72.8416),
            available_beds: 10,
            specialties: vec!["trauma".to_string()],
            contact_phone: None,
        })
        .await?;

    let detector = Arc::new(SensorDetector::new(
        repos.detections.clone(),
        dispatch,
        notifier,
        DetectorConfig::default(),
    ));

    let (sender, source) = ChannelTelemetrySource::new(64);
    let monitor = Arc::new(SensorMonitor::new(source, detector, 1));

    let shutdown = CancellationToken::new();
    monitor.start(shutdown.clone()).await?;

    let mut rng = rand::thread_rng();

    for round in 0..30 {
        let mut sample = RawTelemetry {
            device_id: Some("vehicle-unit-01".to_string()),
            temperature: Some(rng.gen_range(18.0..32.0)),
            humidity: Some(rng.gen_range(40.0..90.0)),
            gas_level: Some(rng.gen_range(50_000.0..500_000.0)),
            latitude: Some(19.0760 + rng.gen_range(-0.01..0.01)),
            longitude: Some(72.8777 + rng.gen_range(-0.01..0.01)),
            speed_kmh: Some(rng.gen_range(20.0..60.0)),
            acceleration: Some(Axes {
                x: rng.gen_range(-0.3..0.3),
                y: rng.gen_range(-0.3..0.3),
                z: 1.0,
            }),
            rotation: Some(Axes::default()),
            recorded_at: Some(Utc::now()),
        };

        // Round 10 simulates a crash, round 20 a gas leak
        if round == 10 {
            info!("Injecting crash telemetry");
            sample.acceleration = Some(Axes {
                x: 6.5,
                y: 1.2,
                z: 0.8,
            });
            sample.speed_kmh = Some(2.0);
        } else if round == 20 {
            info!("Injecting gas leak telemetry");
            sample.gas_level = Some(25_000_000.0);
        }

        sender.send(sample).await?;
        sleep(Duration::from_millis(200)).await;
    }

    // Give the monitor a final tick to drain the channel
    sleep(Duration::from_secs(2)).await;
    shutdown.cancel();

    let detections = repos.detections.get_all().await?;
    let incidents = repos.incidents.get_all().await?;

    info!(
        "Simulation produced {} detections and {} incidents",
        detections.len(),
        incidents.len()
    );
    for detection in &detections {
        info!(
            "  {} {} (value {:.2}, threshold {:.2}) -> incident {:?}",
            detection.severity,
            detection.trigger,
            detection.value,
            detection.threshold,
            detection.incident_id
        );
    }

    if detections.is_empty() {
        error!("❌ Expected the injected faults to trip the detector");
    } else {
        info!("✅ Detector processed the injected faults");
    }

    Ok(())
}
