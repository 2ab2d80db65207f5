use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::messaging::event::{NotificationKind, RecipientKind};

/// Notification model
///
/// One delivery record per recipient. `recipient_id` of `None` means a
/// broadcast to everyone of that recipient kind, which is how freshly
/// claimable incidents reach responders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: RecipientKind,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub incident_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: RecipientKind,
        recipient_id: Option<String>,
        incident_id: Option<Uuid>,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Self {
        Notification {
            id: Uuid::new_v4(),
            recipient,
            recipient_id,
            incident_id,
            kind,
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    /// Routing key used on the live channel, `kind` plus the incident
    /// the notification concerns.
    pub fn routing_key(&self) -> String {
        match &self.incident_id {
            Some(id) => format!("{}.{}", self.kind, id),
            None => self.kind.to_string(),
        }
    }
}
