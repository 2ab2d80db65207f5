use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::geo::Coordinate;

/// Responder assignment lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Accepted,
    EnRoute,
    Arrived,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub const ALL: [AssignmentStatus; 5] = [
        AssignmentStatus::Accepted,
        AssignmentStatus::EnRoute,
        AssignmentStatus::Arrived,
        AssignmentStatus::Completed,
        AssignmentStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssignmentStatus::Completed | AssignmentStatus::Cancelled
        )
    }

    /// `Accepted -> Arrived` is legal so that a responder who never
    /// streamed a position update (or spawned next to the scene) can
    /// still be progressed manually.
    pub fn can_transition_to(&self, next: AssignmentStatus) -> bool {
        use AssignmentStatus::*;
        match (self, next) {
            (Accepted, EnRoute) => true,
            (Accepted, Arrived) => true,
            (EnRoute, Arrived) => true,
            (Arrived, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl Display for AssignmentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::EnRoute => write!(f, "en_route"),
            Self::Arrived => write!(f, "arrived"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Trip leg the responder is currently on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripPhase {
    ToAccident,
    ToHospital,
    Completed,
}

impl Display for TripPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToAccident => write!(f, "to_accident"),
            Self::ToHospital => write!(f, "to_hospital"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Assignment model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub responder_id: String,
    pub hospital_id: Uuid,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub eta_minutes: Option<i64>,
    #[serde(default)]
    pub last_location: Option<Coordinate>,
    /// Whether the last ping was inside the arrival ring of the current
    /// destination. Auto-arrival fires on the false-to-true edge and the
    /// flag starts fresh on every leg.
    #[serde(default)]
    pub near_destination: bool,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(incident_id: Uuid, responder_id: String, hospital_id: Uuid) -> Self {
        let now = Utc::now();
        Assignment {
            id: Uuid::new_v4(),
            incident_id,
            responder_id,
            hospital_id,
            status: AssignmentStatus::Accepted,
            eta_minutes: None,
            last_location: None,
            near_destination: false,
            cancel_reason: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Leg of the trip implied by the current status. `None` once the
    /// assignment is cancelled, since the trip no longer exists.
    pub fn phase(&self) -> Option<TripPhase> {
        match self.status {
            AssignmentStatus::Accepted | AssignmentStatus::EnRoute => Some(TripPhase::ToAccident),
            AssignmentStatus::Arrived => Some(TripPhase::ToHospital),
            AssignmentStatus::Completed => Some(TripPhase::Completed),
            AssignmentStatus::Cancelled => None,
        }
    }
}

/// Record of a responder declining an incident. Rejections are advisory
/// only; the incident stays claimable by everyone else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub responder_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
