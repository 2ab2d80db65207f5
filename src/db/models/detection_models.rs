use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::db::models::incident_models::Severity;
use crate::error::Error;
use crate::geo::Coordinate;

/// Three-axis sample from the accelerometer or gyroscope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Axes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axes {
    /// Magnitude of the vector, in the unit of its components.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// One complete reading from a vehicle sensor unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub gas_level: f64,
    pub location: Coordinate,
    pub speed_kmh: f64,
    pub acceleration: Axes,
    pub rotation: Axes,
    pub recorded_at: DateTime<Utc>,
}

/// Wire form of a telemetry sample. Every sensor field is optional so
/// that a partial upload can be detected and skipped instead of being
/// silently read as zeros.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTelemetry {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub gas_level: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    #[serde(default)]
    pub acceleration: Option<Axes>,
    #[serde(default)]
    pub rotation: Option<Axes>,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl RawTelemetry {
    /// Promotes a raw sample to a full snapshot, or names the fields
    /// that are missing. A missing timestamp is stamped with the server
    /// clock; missing sensor values are never defaulted.
    pub fn into_snapshot(self, fallback_device: &str) -> Result<SensorSnapshot, Error> {
        let mut missing: Vec<&str> = Vec::new();

        if self.temperature.is_none() {
            missing.push("temperature");
        }
        if self.humidity.is_none() {
            missing.push("humidity");
        }
        if self.gas_level.is_none() {
            missing.push("gas_level");
        }
        if self.latitude.is_none() {
            missing.push("latitude");
        }
        if self.longitude.is_none() {
            missing.push("longitude");
        }
        if self.speed_kmh.is_none() {
            missing.push("speed_kmh");
        }
        if self.acceleration.is_none() {
            missing.push("acceleration");
        }
        if self.rotation.is_none() {
            missing.push("rotation");
        }
        if !missing.is_empty() {
            return Err(Error::Telemetry(format!(
                "incomplete sample, missing: {}",
                missing.join(", ")
            )));
        }

        Ok(SensorSnapshot {
            device_id: self
                .device_id
                .unwrap_or_else(|| fallback_device.to_string()),
            temperature: self.temperature.unwrap_or_default(),
            humidity: self.humidity.unwrap_or_default(),
            gas_level: self.gas_level.unwrap_or_default(),
            location: Coordinate::new(
                self.latitude.unwrap_or_default(),
                self.longitude.unwrap_or_default(),
            ),
            speed_kmh: self.speed_kmh.unwrap_or_default(),
            acceleration: self.acceleration.unwrap_or_default(),
            rotation: self.rotation.unwrap_or_default(),
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
        })
    }
}

/// What tripped the detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Gas,
    Temperature,
    Impact,
    SuddenStop,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::Gas,
        TriggerKind::Temperature,
        TriggerKind::Impact,
        TriggerKind::SuddenStop,
    ];
}

impl Display for TriggerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gas => write!(f, "gas"),
            Self::Temperature => write!(f, "temperature"),
            Self::Impact => write!(f, "impact"),
            Self::SuddenStop => write!(f, "sudden_stop"),
        }
    }
}

/// Whether the detection has been turned into an incident yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Detected,
    Processed,
}

impl Display for DetectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detected => write!(f, "detected"),
            Self::Processed => write!(f, "processed"),
        }
    }
}

/// Detection model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: Uuid,
    pub device_id: String,
    pub trigger: TriggerKind,
    pub severity: Severity,
    /// Measured value that tripped the trigger.
    pub value: f64,
    /// Threshold it was compared against.
    pub threshold: f64,
    pub snapshot: SensorSnapshot,
    #[serde(default)]
    pub incident_id: Option<Uuid>,
    pub status: DetectionStatus,
    pub detected_at: DateTime<Utc>,
}

/// Cooldown claim for one (device, trigger) pair. Stored under a
/// deterministic document id so that concurrent engine instances race
/// on the same record instead of each minting their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownMarker {
    pub device_id: String,
    pub trigger: TriggerKind,
    pub last_fired_at: DateTime<Utc>,
}

impl CooldownMarker {
    pub fn document_id(device_id: &str, trigger: TriggerKind) -> Uuid {
        let key = format!("cooldown/{}/{}", device_id, trigger);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }
}
