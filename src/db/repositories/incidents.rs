use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::document::{to_body, DocumentStore, Versioned};
use crate::db::models::incident_models::{Incident, IncidentStatus, NewIncident};
use crate::error::Error;

pub const COLLECTION: &str = "incidents";

/// Incidents repository for handling incident operations
#[derive(Clone)]
pub struct IncidentsRepository {
    store: Arc<dyn DocumentStore>,
}

impl IncidentsRepository {
    /// Create a new incidents repository
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create a new incident in `pending` status
    pub async fn create(&self, new_incident: NewIncident) -> Result<Incident> {
        new_incident.validate()?;

        let incident = new_incident.into_incident(Utc::now());
        self.store
            .insert(COLLECTION, incident.id, to_body(&incident)?)
            .await?;

        Ok(incident)
    }

    /// Get incident by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Incident> {
        Ok(self.get_versioned(id).await?.record)
    }

    /// Get incident by ID together with its store version
    pub async fn get_versioned(&self, id: Uuid) -> Result<Versioned<Incident>> {
        let doc = self
            .store
            .get(COLLECTION, id)
            .await?
            .ok_or_else(|| Error::not_found("incident", id))?;

        Versioned::decode(doc)
    }

    /// Get all incidents in creation order
    pub async fn get_all(&self) -> Result<Vec<Incident>> {
        let docs = self.store.list(COLLECTION).await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<Incident>::decode(doc)?.record))
            .collect()
    }

    /// Get all incidents with their store versions, in creation order
    pub async fn get_all_versioned(&self) -> Result<Vec<Versioned<Incident>>> {
        let docs = self.store.list(COLLECTION).await?;
        docs.into_iter().map(Versioned::decode).collect()
    }

    /// Get incidents reported by one reporter
    pub async fn get_by_reporter(&self, reporter_id: &str) -> Result<Vec<Incident>> {
        let docs = self
            .store
            .find(COLLECTION, "reporter_id", &json!(reporter_id))
            .await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<Incident>::decode(doc)?.record))
            .collect()
    }

    /// Get incidents in one status
    pub async fn get_by_status(&self, status: IncidentStatus) -> Result<Vec<Incident>> {
        let docs = self
            .store
            .find(COLLECTION, "status", &json!(status))
            .await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<Incident>::decode(doc)?.record))
            .collect()
    }

    /// Move an incident along the transition table with a version-checked
    /// write. Rejects out-of-graph moves with the incident's actual
    /// current status; a lost version race surfaces as a conflict.
    pub async fn update_status(
        &self,
        current: &Versioned<Incident>,
        to: IncidentStatus,
    ) -> Result<Versioned<Incident>> {
        if !current.record.status.can_transition_to(to) {
            return Err(Error::invalid_transition(
                "incident",
                current.record.id,
                current.record.status,
                to,
            )
            .into());
        }

        self.write_status(current, to).await
    }

    /// Roll an incident back to `hospital_accepted` after its assignment
    /// was cancelled. This is the only caller of the backward edge.
    pub async fn rollback_to_accepted(
        &self,
        current: &Versioned<Incident>,
    ) -> Result<Versioned<Incident>> {
        if !current.record.status.can_rollback_to_accepted() {
            return Err(Error::invalid_transition(
                "incident",
                current.record.id,
                current.record.status,
                IncidentStatus::HospitalAccepted,
            )
            .into());
        }

        self.write_status(current, IncidentStatus::HospitalAccepted)
            .await
    }

    async fn write_status(
        &self,
        current: &Versioned<Incident>,
        to: IncidentStatus,
    ) -> Result<Versioned<Incident>> {
        let mut updated = current.record.clone();
        updated.status = to;
        updated.updated_at = Utc::now();

        let doc = self
            .store
            .compare_and_swap(COLLECTION, updated.id, current.version, to_body(&updated)?)
            .await?;

        Versioned::decode(doc)
    }

    /// Delete an incident that has not progressed past hospital
    /// notification. Returns the removed incident.
    pub async fn delete(&self, id: Uuid) -> Result<Incident> {
        let current = self.get_versioned(id).await?;

        if !IncidentStatus::DELETABLE.contains(&current.record.status) {
            return Err(Error::invalid_transition(
                "incident",
                id,
                current.record.status,
                "deleted",
            )
            .into());
        }

        self.store.delete(COLLECTION, id).await?;

        Ok(current.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::models::incident_models::Severity;
    use crate::geo::Coordinate;

    fn repo() -> IncidentsRepository {
        IncidentsRepository::new(MemoryStore::shared())
    }

    fn report(reporter: &str) -> NewIncident {
        NewIncident {
            reporter_id: reporter.into(),
            location: Coordinate::new(19.076, 72.8777),
            description: "collision on the expressway".into(),
            severity: Severity::High,
            injured_count: 1,
            vehicle_count: 2,
            notes: None,
            contact_phone: None,
        }
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let repo = repo();
        let incident = repo.create(report("user-1")).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::Pending);

        let loaded = repo.get_by_id(incident.id).await.unwrap();
        assert_eq!(loaded.description, "collision on the expressway");
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let repo = repo();
        let err = repo.get_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(crate::error::is_not_found(&err));
    }

    #[tokio::test]
    async fn out_of_graph_update_is_rejected_with_actual_status() {
        let repo = repo();
        let incident = repo.create(report("user-1")).await.unwrap();
        let current = repo.get_versioned(incident.id).await.unwrap();

        let err = repo
            .update_status(&current, IncidentStatus::Completed)
            .await
            .unwrap_err();
        assert!(crate::error::is_invalid_transition(&err));
        assert!(err.to_string().contains("pending"), "{}", err);
    }

    #[tokio::test]
    async fn stale_version_update_conflicts() {
        let repo = repo();
        let incident = repo.create(report("user-1")).await.unwrap();
        let stale = repo.get_versioned(incident.id).await.unwrap();

        repo.update_status(&stale, IncidentStatus::HospitalNotified)
            .await
            .unwrap();

        let err = repo
            .update_status(&stale, IncidentStatus::HospitalNotified)
            .await
            .unwrap_err();
        assert!(crate::error::is_conflict(&err));
    }

    #[tokio::test]
    async fn delete_is_refused_once_accepted() {
        let repo = repo();
        let incident = repo.create(report("user-1")).await.unwrap();

        let current = repo.get_versioned(incident.id).await.unwrap();
        repo.update_status(&current, IncidentStatus::HospitalAccepted)
            .await
            .unwrap();

        let err = repo.delete(incident.id).await.unwrap_err();
        assert!(crate::error::is_invalid_transition(&err));

        // Still present afterwards.
        assert!(repo.get_by_id(incident.id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_works_while_pending() {
        let repo = repo();
        let incident = repo.create(report("user-1")).await.unwrap();

        let removed = repo.delete(incident.id).await.unwrap();
        assert_eq!(removed.id, incident.id);

        let err = repo.get_by_id(incident.id).await.unwrap_err();
        assert!(crate::error::is_not_found(&err));
    }

    #[tokio::test]
    async fn reporter_filter_keeps_creation_order() {
        let repo = repo();
        let first = repo.create(report("user-7")).await.unwrap();
        repo.create(report("someone-else")).await.unwrap();
        let second = repo.create(report("user-7")).await.unwrap();

        let mine = repo.get_by_reporter("user-7").await.unwrap();
        let ids: Vec<Uuid> = mine.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
