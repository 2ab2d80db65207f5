use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::document::{to_body, DocumentStore, Versioned};
use crate::db::models::detection_models::{
    CooldownMarker, DetectionRecord, DetectionStatus, TriggerKind,
};
use crate::error::{self, Error};

pub const COLLECTION: &str = "detections";
pub const COOLDOWNS: &str = "detector_cooldowns";

/// Detections repository for sensor emergency records and their
/// cooldown markers
#[derive(Clone)]
pub struct DetectionsRepository {
    store: Arc<dyn DocumentStore>,
}

impl DetectionsRepository {
    /// Create a new detections repository
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist a detection record
    pub async fn create(&self, detection: &DetectionRecord) -> Result<()> {
        self.store
            .insert(COLLECTION, detection.id, to_body(detection)?)
            .await?;
        Ok(())
    }

    /// Get detection by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<DetectionRecord> {
        Ok(self.get_versioned(id).await?.record)
    }

    /// Get detection by ID together with its store version
    pub async fn get_versioned(&self, id: Uuid) -> Result<Versioned<DetectionRecord>> {
        let doc = self
            .store
            .get(COLLECTION, id)
            .await?
            .ok_or_else(|| Error::not_found("detection", id))?;

        Versioned::decode(doc)
    }

    /// Get all detections in detection order
    pub async fn get_all(&self) -> Result<Vec<DetectionRecord>> {
        let docs = self.store.list(COLLECTION).await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<DetectionRecord>::decode(doc)?.record))
            .collect()
    }

    /// Get detections raised by one device
    pub async fn get_by_device(&self, device_id: &str) -> Result<Vec<DetectionRecord>> {
        let docs = self
            .store
            .find(COLLECTION, "device_id", &json!(device_id))
            .await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<DetectionRecord>::decode(doc)?.record))
            .collect()
    }

    /// Link a detection to the incident synthesized from it and mark it
    /// processed
    pub async fn mark_processed(
        &self,
        current: &Versioned<DetectionRecord>,
        incident_id: Uuid,
    ) -> Result<Versioned<DetectionRecord>> {
        let mut updated = current.record.clone();
        updated.incident_id = Some(incident_id);
        updated.status = DetectionStatus::Processed;

        let doc = self
            .store
            .compare_and_swap(COLLECTION, updated.id, current.version, to_body(&updated)?)
            .await?;

        Versioned::decode(doc)
    }

    /// Try to claim the cooldown slot for a (device, trigger) pair.
    ///
    /// Returns true when this caller won the slot and may fire. Returns
    /// false when the window is still open or another engine instance
    /// claimed it first; both the insert race and the version race on
    /// an expired marker resolve to exactly one winner.
    pub async fn claim_cooldown(
        &self,
        device_id: &str,
        trigger: TriggerKind,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool> {
        let marker_id = CooldownMarker::document_id(device_id, trigger);
        let marker = CooldownMarker {
            device_id: device_id.to_string(),
            trigger,
            last_fired_at: now,
        };

        match self.store.get(COOLDOWNS, marker_id).await? {
            None => match self
                .store
                .insert(COOLDOWNS, marker_id, to_body(&marker)?)
                .await
            {
                Ok(_) => Ok(true),
                Err(e) if error::is_conflict(&e) => Ok(false),
                Err(e) => Err(e),
            },
            Some(doc) => {
                let existing = Versioned::<CooldownMarker>::decode(doc)?;
                if now - existing.record.last_fired_at < window {
                    return Ok(false);
                }

                match self
                    .store
                    .compare_and_swap(COOLDOWNS, marker_id, existing.version, to_body(&marker)?)
                    .await
                {
                    Ok(_) => Ok(true),
                    Err(e) if error::is_conflict(&e) => Ok(false),
                    Err(e) => Err(e),
                }
            }
        }
    }
}
