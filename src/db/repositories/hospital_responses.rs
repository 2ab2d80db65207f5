use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::document::{to_body, DocumentStore, Versioned};
use crate::db::models::hospital_models::{HospitalResponse, NewHospitalResponse, ResponseDecision};

pub const COLLECTION: &str = "hospital_responses";

/// Hospital responses repository
#[derive(Clone)]
pub struct HospitalResponsesRepository {
    store: Arc<dyn DocumentStore>,
}

impl HospitalResponsesRepository {
    /// Create a new hospital responses repository
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Record a hospital's answer to an incident
    pub async fn create(
        &self,
        incident_id: Uuid,
        hospital_name: &str,
        answer: NewHospitalResponse,
    ) -> Result<HospitalResponse> {
        let response = HospitalResponse {
            id: Uuid::new_v4(),
            incident_id,
            hospital_id: answer.hospital_id,
            hospital_name: hospital_name.to_string(),
            decision: answer.decision,
            beds_offered: answer.beds_offered,
            eta_minutes: answer.eta_minutes,
            reason: answer.reason,
            specialties: answer.specialties,
            created_at: Utc::now(),
        };

        self.store
            .insert(COLLECTION, response.id, to_body(&response)?)
            .await?;

        Ok(response)
    }

    /// Get every response recorded for an incident, oldest first
    pub async fn get_for_incident(&self, incident_id: Uuid) -> Result<Vec<HospitalResponse>> {
        let docs = self
            .store
            .find(COLLECTION, "incident_id", &json!(incident_id))
            .await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<HospitalResponse>::decode(doc)?.record))
            .collect()
    }

    /// Get the accepting responses for an incident, oldest first
    pub async fn accepted_for_incident(&self, incident_id: Uuid) -> Result<Vec<HospitalResponse>> {
        let responses = self.get_for_incident(incident_id).await?;
        Ok(responses
            .into_iter()
            .filter(|r| r.decision == ResponseDecision::Accepted)
            .collect())
    }

    /// Whether one specific hospital has accepted this incident
    pub async fn hospital_has_accepted(&self, incident_id: Uuid, hospital_id: Uuid) -> Result<bool> {
        let accepted = self.accepted_for_incident(incident_id).await?;
        Ok(accepted.iter().any(|r| r.hospital_id == hospital_id))
    }
}
