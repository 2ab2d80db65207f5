use crate::config::DetectorConfig;
use crate::db::models::detection_models::{
    DetectionRecord, DetectionStatus, RawTelemetry, SensorSnapshot, TriggerKind,
};
use crate::db::models::incident_models::{NewIncident, Severity};
use crate::db::models::notification_models::Notification;
use crate::db::repositories::DetectionsRepository;
use crate::messaging::event::{NotificationKind, RecipientKind};
use crate::messaging::NotifierTrait;
use crate::services::dispatch::DispatchService;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Temperature above which a heat trigger escalates to critical.
pub const CRITICAL_TEMPERATURE_C: f64 = 80.0;

/// Impact force above which a crash trigger escalates to critical.
pub const CRITICAL_IMPACT_G: f64 = 5.0;

/// One tripped threshold inside a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TriggerHit {
    pub trigger: TriggerKind,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
}

/// Sensor emergency detector turning telemetry into incidents
pub struct SensorDetector {
    detections_repo: DetectionsRepository,
    dispatch: Arc<DispatchService>,
    notifier: Arc<dyn NotifierTrait>,
    config: DetectorConfig,
}

impl SensorDetector {
    /// Create a new sensor detector
    pub fn new(
        detections_repo: DetectionsRepository,
        dispatch: Arc<DispatchService>,
        notifier: Arc<dyn NotifierTrait>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            detections_repo,
            dispatch,
            notifier,
            config,
        }
    }

    /// Device identity used when a sample does not name its own.
    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    /// Check every trigger against a snapshot. Pure threshold logic, no
    /// cooldowns applied yet.
    ///
    /// Gas escalates to critical past twice its threshold; heat and
    /// impact escalate past fixed points. A near-standstill reads as a
    /// sudden stop at medium severity.
    pub fn evaluate(&self, snapshot: &SensorSnapshot) -> Vec<TriggerHit> {
        let mut hits = Vec::new();

        if snapshot.gas_level > self.config.gas_threshold {
            let severity = if snapshot.gas_level > self.config.gas_threshold * 2.0 {
                Severity::Critical
            } else {
                Severity::High
            };
            hits.push(TriggerHit {
                trigger: TriggerKind::Gas,
                severity,
                value: snapshot.gas_level,
                threshold: self.config.gas_threshold,
            });
        }

        if snapshot.temperature > self.config.temperature_threshold {
            let severity = if snapshot.temperature > CRITICAL_TEMPERATURE_C {
                Severity::Critical
            } else {
                Severity::High
            };
            hits.push(TriggerHit {
                trigger: TriggerKind::Temperature,
                severity,
                value: snapshot.temperature,
                threshold: self.config.temperature_threshold,
            });
        }

        let impact_g = snapshot.acceleration.magnitude();
        if impact_g > self.config.impact_g_threshold {
            let severity = if impact_g > CRITICAL_IMPACT_G {
                Severity::Critical
            } else {
                Severity::High
            };
            hits.push(TriggerHit {
                trigger: TriggerKind::Impact,
                severity,
                value: impact_g,
                threshold: self.config.impact_g_threshold,
            });
        }

        if snapshot.speed_kmh >= 0.0 && snapshot.speed_kmh < self.config.sudden_stop_speed_kmh {
            hits.push(TriggerHit {
                trigger: TriggerKind::SuddenStop,
                severity: Severity::Medium,
                value: snapshot.speed_kmh,
                threshold: self.config.sudden_stop_speed_kmh,
            });
        }

        hits
    }

    /// Run detection on one snapshot: evaluate triggers, honor their
    /// cooldowns and raise an incident for each one that fires. Returns
    /// the detection records written.
    pub async fn process(&self, snapshot: SensorSnapshot) -> Result<Vec<DetectionRecord>> {
        let hits = self.evaluate(&snapshot);
        let mut fired = Vec::new();

        for hit in hits {
            let claimed = self
                .detections_repo
                .claim_cooldown(
                    &snapshot.device_id,
                    hit.trigger,
                    Utc::now(),
                    chrono::Duration::seconds(self.config.cooldown_secs as i64),
                )
                .await?;

            if !claimed {
                debug!(
                    "Cooldown active for {} on device {}, skipping",
                    hit.trigger, snapshot.device_id
                );
                continue;
            }

            fired.push(self.fire(&snapshot, hit).await?);
        }

        Ok(fired)
    }

    /// Persist a detection and raise the matching incident. The
    /// detection is on record before the incident attempt; if that
    /// attempt fails the record stays detected and unlinked.
    async fn fire(&self, snapshot: &SensorSnapshot, hit: TriggerHit) -> Result<DetectionRecord> {
        let mut record = DetectionRecord {
            id: Uuid::new_v4(),
            device_id: snapshot.device_id.clone(),
            trigger: hit.trigger,
            severity: hit.severity,
            value: hit.value,
            threshold: hit.threshold,
            snapshot: snapshot.clone(),
            incident_id: None,
            status: DetectionStatus::Detected,
            detected_at: Utc::now(),
        };

        self.detections_repo.create(&record).await?;

        info!(
            "{} emergency detected on device {} ({:.2} over threshold {:.2})",
            hit.trigger, snapshot.device_id, hit.value, hit.threshold
        );

        let new_incident = NewIncident {
            reporter_id: self.config.reporter_id.clone(),
            location: snapshot.location,
            description: format!(
                "Automatic {} emergency detected by device {}",
                hit.trigger, snapshot.device_id
            ),
            severity: hit.severity,
            injured_count: 1,
            vehicle_count: 1,
            notes: Some(format!(
                "Sensor reading {:.2} exceeded threshold {:.2}",
                hit.value, hit.threshold
            )),
            contact_phone: Some(self.config.owner_contact.clone()),
        };

        match self.dispatch.report_incident(new_incident).await {
            Ok(incident) => {
                let current = self.detections_repo.get_versioned(record.id).await?;
                match self
                    .detections_repo
                    .mark_processed(&current, incident.id)
                    .await
                {
                    Ok(updated) => record = updated.record,
                    Err(e) => error!(
                        "Failed to link detection {} to incident {}: {}",
                        record.id, incident.id, e
                    ),
                }

                if let Err(e) = self
                    .notifier
                    .notify(Notification::new(
                        RecipientKind::Reporter,
                        Some(self.config.reporter_id.clone()),
                        Some(incident.id),
                        NotificationKind::SensorEmergency,
                        format!(
                            "Emergency auto-reported from vehicle {}: {}",
                            snapshot.device_id, hit.trigger
                        ),
                    ))
                    .await
                {
                    warn!("Notification delivery failed: {}", e);
                }
            }
            Err(e) => {
                error!(
                    "Detection {} could not raise an incident: {}",
                    record.id, e
                );
            }
        }

        Ok(record)
    }
}

/// Source of raw telemetry samples for the monitor to poll.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Next buffered sample, or None when nothing is waiting right now.
    async fn try_next(&self) -> Result<Option<RawTelemetry>>;
}

/// Channel-fed telemetry source, filled by the ingest endpoint.
pub struct ChannelTelemetrySource {
    receiver: Mutex<mpsc::Receiver<RawTelemetry>>,
}

impl ChannelTelemetrySource {
    /// Create the source plus the sender half handed to producers.
    pub fn new(buffer: usize) -> (mpsc::Sender<RawTelemetry>, Arc<Self>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (
            sender,
            Arc::new(Self {
                receiver: Mutex::new(receiver),
            }),
        )
    }
}

#[async_trait]
impl TelemetrySource for ChannelTelemetrySource {
    async fn try_next(&self) -> Result<Option<RawTelemetry>> {
        let mut receiver = self.receiver.lock().await;
        match receiver.try_recv() {
            Ok(sample) => Ok(Some(sample)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Ok(None),
        }
    }
}

/// Sensor monitor polling a telemetry source on an interval
pub struct SensorMonitor {
    source: Arc<dyn TelemetrySource>,
    detector: Arc<SensorDetector>,
    poll_interval: Duration,
}

impl SensorMonitor {
    /// Create a new sensor monitor
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        detector: Arc<SensorDetector>,
        poll_interval_secs: u64,
    ) -> Self {
        Self {
            source,
            detector,
            poll_interval: Duration::from_secs(poll_interval_secs),
        }
    }

    /// Start the sensor monitor loop
    pub async fn start(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        info!("Starting sensor monitor");

        tokio::spawn(async move {
            let mut interval = interval(self.poll_interval);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Sensor monitor stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.drain_source().await {
                            error!("Error processing telemetry: {}", e);
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Pull every waiting sample off the source and run detection on it.
    /// Incomplete samples are skipped, never zero-filled.
    pub async fn drain_source(&self) -> Result<()> {
        while let Some(raw) = self.source.try_next().await? {
            let snapshot = match raw.into_snapshot(self.detector.device_id()) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Skipping telemetry sample: {}", e);
                    continue;
                }
            };

            if let Err(e) = self.detector.process(snapshot).await {
                error!("Detection pass failed: {}", e);
            }
        }

        Ok(())
    }
}
