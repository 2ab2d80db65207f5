use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::document::{to_body, DocumentStore, Versioned};
use crate::db::models::notification_models::Notification;
use crate::error::Error;
use crate::messaging::event::RecipientKind;

pub const COLLECTION: &str = "notifications";

/// Notifications repository for delivery records
#[derive(Clone)]
pub struct NotificationsRepository {
    store: Arc<dyn DocumentStore>,
}

impl NotificationsRepository {
    /// Create a new notifications repository
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist a notification
    pub async fn create(&self, notification: &Notification) -> Result<()> {
        self.store
            .insert(COLLECTION, notification.id, to_body(notification)?)
            .await?;
        Ok(())
    }

    /// Get all notifications in delivery order
    pub async fn get_all(&self) -> Result<Vec<Notification>> {
        let docs = self.store.list(COLLECTION).await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<Notification>::decode(doc)?.record))
            .collect()
    }

    /// Notifications addressed to one recipient, including broadcasts
    /// to their recipient kind
    pub async fn get_for_recipient(
        &self,
        recipient: RecipientKind,
        recipient_id: &str,
    ) -> Result<Vec<Notification>> {
        let docs = self
            .store
            .find(COLLECTION, "recipient", &json!(recipient))
            .await?;

        let mut result = Vec::new();
        for doc in docs {
            let notification = Versioned::<Notification>::decode(doc)?.record;
            match &notification.recipient_id {
                Some(id) if id == recipient_id => result.push(notification),
                None => result.push(notification),
                Some(_) => {}
            }
        }

        Ok(result)
    }

    /// Notifications raised for one incident
    pub async fn get_for_incident(&self, incident_id: Uuid) -> Result<Vec<Notification>> {
        let docs = self
            .store
            .find(COLLECTION, "incident_id", &json!(incident_id))
            .await?;
        docs.into_iter()
            .map(|doc| Ok(Versioned::<Notification>::decode(doc)?.record))
            .collect()
    }

    /// Mark one notification as read
    pub async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        let doc = self
            .store
            .get(COLLECTION, id)
            .await?
            .ok_or_else(|| Error::not_found("notification", id))?;

        let current = Versioned::<Notification>::decode(doc)?;
        let mut updated = current.record.clone();
        updated.read = true;

        let saved = self
            .store
            .compare_and_swap(COLLECTION, id, current.version, to_body(&updated)?)
            .await?;

        Ok(Versioned::<Notification>::decode(saved)?.record)
    }

    /// Drop every notification belonging to an incident. Returns how
    /// many were removed.
    pub async fn delete_for_incident(&self, incident_id: Uuid) -> Result<usize> {
        let notifications = self.get_for_incident(incident_id).await?;
        let mut removed = 0;

        for notification in &notifications {
            if self.store.delete(COLLECTION, notification.id).await? {
                removed += 1;
            }
        }

        Ok(removed)
    }
}
