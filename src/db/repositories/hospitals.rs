use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::document::{to_body, DocumentStore, Versioned};
use crate::db::models::hospital_models::{Hospital, NewHospital};
use crate::error::Error;

pub const COLLECTION: &str = "hospitals";

/// Hospitals repository for handling hospital operations
#[derive(Clone)]
pub struct HospitalsRepository {
    store: Arc<dyn DocumentStore>,
}

impl HospitalsRepository {
    /// Create a new hospitals repository
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Register a hospital
    pub async fn create(&self, new_hospital: NewHospital) -> Result<Hospital> {
        new_hospital.validate()?;

        let hospital = new_hospital.into_hospital(Utc::now());
        self.store
            .insert(COLLECTION, hospital.id, to_body(&hospital)?)
            .await?;

        Ok(hospital)
    }

    /// Get hospital by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Hospital> {
        let doc = self
            .store
            .get(COLLECTION, id)
            .await?
            .ok_or_else(|| Error::not_found("hospital", id))?;

        Ok(Versioned::<Hospital>::decode(doc)?.record)
    }

    /// Get all hospitals in registration order
    pub async fn get_all(&self) -> Result<Vec<Hospital>> {
        let docs = self.store.list(COLLECTION).await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<Hospital>::decode(doc)?.record))
            .collect()
    }
}
