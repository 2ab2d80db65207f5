use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::document::{to_body, DocumentStore, Versioned};
use crate::db::models::assignment_models::{Assignment, AssignmentStatus, RejectionRecord};
use crate::error::Error;

pub const COLLECTION: &str = "assignments";
pub const REJECTIONS: &str = "responder_rejections";

/// Assignments repository for handling responder assignments
#[derive(Clone)]
pub struct AssignmentsRepository {
    store: Arc<dyn DocumentStore>,
}

impl AssignmentsRepository {
    /// Create a new assignments repository
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist a freshly created assignment
    pub async fn create(&self, assignment: &Assignment) -> Result<()> {
        self.store
            .insert(COLLECTION, assignment.id, to_body(assignment)?)
            .await?;
        Ok(())
    }

    /// Get assignment by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Assignment> {
        Ok(self.get_versioned(id).await?.record)
    }

    /// Get assignment by ID together with its store version
    pub async fn get_versioned(&self, id: Uuid) -> Result<Versioned<Assignment>> {
        let doc = self
            .store
            .get(COLLECTION, id)
            .await?
            .ok_or_else(|| Error::not_found("assignment", id))?;

        Versioned::decode(doc)
    }

    /// Get all assignments in creation order
    pub async fn get_all(&self) -> Result<Vec<Assignment>> {
        let docs = self.store.list(COLLECTION).await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<Assignment>::decode(doc)?.record))
            .collect()
    }

    /// Get assignments claimed by one responder
    pub async fn get_by_responder(&self, responder_id: &str) -> Result<Vec<Assignment>> {
        let docs = self
            .store
            .find(COLLECTION, "responder_id", &json!(responder_id))
            .await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<Assignment>::decode(doc)?.record))
            .collect()
    }

    /// The live (non-terminal) assignment of an incident, if any
    pub async fn active_for_incident(&self, incident_id: Uuid) -> Result<Option<Assignment>> {
        let docs = self
            .store
            .find(COLLECTION, "incident_id", &json!(incident_id))
            .await?;

        for doc in docs {
            let assignment = Versioned::<Assignment>::decode(doc)?.record;
            if !assignment.status.is_terminal() {
                return Ok(Some(assignment));
            }
        }

        Ok(None)
    }

    /// Version-checked write of an updated assignment. A status change
    /// must follow the transition table; every write refreshes
    /// `updated_at`.
    pub async fn save(
        &self,
        current: &Versioned<Assignment>,
        mut updated: Assignment,
    ) -> Result<Versioned<Assignment>> {
        let from = current.record.status;
        if from != updated.status && !from.can_transition_to(updated.status) {
            return Err(
                Error::invalid_transition("assignment", updated.id, from, updated.status).into(),
            );
        }

        updated.updated_at = Utc::now();

        let doc = self
            .store
            .compare_and_swap(COLLECTION, updated.id, current.version, to_body(&updated)?)
            .await?;

        Versioned::decode(doc)
    }

    /// Move an assignment to a new status, leaving other fields alone
    pub async fn update_status(
        &self,
        current: &Versioned<Assignment>,
        to: AssignmentStatus,
    ) -> Result<Versioned<Assignment>> {
        let mut updated = current.record.clone();
        updated.status = to;
        self.save(current, updated).await
    }

    /// Remove a compensating assignment that lost its claim race
    pub async fn discard(&self, id: Uuid) -> Result<bool> {
        self.store.delete(COLLECTION, id).await
    }

    /// Record a responder declining an incident
    pub async fn record_rejection(
        &self,
        incident_id: Uuid,
        responder_id: &str,
        reason: Option<String>,
    ) -> Result<RejectionRecord> {
        let rejection = RejectionRecord {
            id: Uuid::new_v4(),
            incident_id,
            responder_id: responder_id.to_string(),
            reason,
            created_at: Utc::now(),
        };

        self.store
            .insert(REJECTIONS, rejection.id, to_body(&rejection)?)
            .await?;

        Ok(rejection)
    }

    /// Get all rejections recorded for an incident
    pub async fn rejections_for_incident(&self, incident_id: Uuid) -> Result<Vec<RejectionRecord>> {
        let docs = self
            .store
            .find(REJECTIONS, "incident_id", &json!(incident_id))
            .await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<RejectionRecord>::decode(doc)?.record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    fn repo() -> AssignmentsRepository {
        AssignmentsRepository::new(MemoryStore::shared())
    }

    #[tokio::test]
    async fn active_lookup_skips_terminal_assignments() {
        let repo = repo();
        let incident_id = Uuid::new_v4();

        let mut cancelled = Assignment::new(incident_id, "resp-1".into(), Uuid::new_v4());
        cancelled.status = AssignmentStatus::Cancelled;
        repo.create(&cancelled).await.unwrap();

        assert!(repo
            .active_for_incident(incident_id)
            .await
            .unwrap()
            .is_none());

        let live = Assignment::new(incident_id, "resp-2".into(), Uuid::new_v4());
        repo.create(&live).await.unwrap();

        let found = repo.active_for_incident(incident_id).await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(live.id));
    }

    #[tokio::test]
    async fn save_rejects_out_of_graph_status_change() {
        let repo = repo();
        let assignment = Assignment::new(Uuid::new_v4(), "resp-1".into(), Uuid::new_v4());
        repo.create(&assignment).await.unwrap();

        let current = repo.get_versioned(assignment.id).await.unwrap();
        let err = repo
            .update_status(&current, AssignmentStatus::Completed)
            .await
            .unwrap_err();
        assert!(crate::error::is_invalid_transition(&err));
    }

    #[tokio::test]
    async fn save_allows_field_updates_without_status_change() {
        let repo = repo();
        let assignment = Assignment::new(Uuid::new_v4(), "resp-1".into(), Uuid::new_v4());
        repo.create(&assignment).await.unwrap();

        let current = repo.get_versioned(assignment.id).await.unwrap();
        let mut updated = current.record.clone();
        updated.eta_minutes = Some(17);

        let saved = repo.save(&current, updated).await.unwrap();
        assert_eq!(saved.record.eta_minutes, Some(17));
        assert_eq!(saved.record.status, AssignmentStatus::Accepted);
    }

    #[tokio::test]
    async fn stale_save_conflicts() {
        let repo = repo();
        let assignment = Assignment::new(Uuid::new_v4(), "resp-1".into(), Uuid::new_v4());
        repo.create(&assignment).await.unwrap();

        let stale = repo.get_versioned(assignment.id).await.unwrap();
        repo.update_status(&stale, AssignmentStatus::EnRoute)
            .await
            .unwrap();

        let err = repo
            .update_status(&stale, AssignmentStatus::EnRoute)
            .await
            .unwrap_err();
        assert!(crate::error::is_conflict(&err));
    }

    #[tokio::test]
    async fn rejections_accumulate_per_incident() {
        let repo = repo();
        let incident_id = Uuid::new_v4();

        repo.record_rejection(incident_id, "resp-1", Some("too far".into()))
            .await
            .unwrap();
        repo.record_rejection(incident_id, "resp-2", None)
            .await
            .unwrap();

        let rejections = repo.rejections_for_incident(incident_id).await.unwrap();
        assert_eq!(rejections.len(), 2);
        assert_eq!(rejections[0].responder_id, "resp-1");
    }
}
