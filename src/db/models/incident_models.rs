use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::error::Error;
use crate::geo::Coordinate;

/// Incident severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Incident lifecycle status.
///
/// Forward edges only; the single backward edge (assigned/in_progress
/// back to hospital_accepted) is reserved for assignment cancellation
/// and never part of the regular transition table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Pending,
    HospitalNotified,
    HospitalAccepted,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 7] = [
        IncidentStatus::Pending,
        IncidentStatus::HospitalNotified,
        IncidentStatus::HospitalAccepted,
        IncidentStatus::Assigned,
        IncidentStatus::InProgress,
        IncidentStatus::Completed,
        IncidentStatus::Cancelled,
    ];

    /// Statuses an incident may still be deleted in.
    pub const DELETABLE: [IncidentStatus; 2] =
        [IncidentStatus::Pending, IncidentStatus::HospitalNotified];

    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Completed | IncidentStatus::Cancelled)
    }

    /// Legal caller-driven transitions. Hospital acceptance is allowed
    /// straight from `Pending` because a hospital can discover an
    /// incident through the nearby query before any notification ran.
    pub fn can_transition_to(&self, next: IncidentStatus) -> bool {
        use IncidentStatus::*;
        match (self, next) {
            (Pending, HospitalNotified) => true,
            (Pending, HospitalAccepted) => true,
            (HospitalNotified, HospitalAccepted) => true,
            (HospitalAccepted, Assigned) => true,
            (Assigned, InProgress) => true,
            (InProgress, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Whether assignment cancellation may roll an incident in this
    /// status back to `HospitalAccepted` for rematching.
    pub fn can_rollback_to_accepted(&self) -> bool {
        matches!(self, IncidentStatus::Assigned | IncidentStatus::InProgress)
    }

    pub fn parse(value: &str) -> Option<IncidentStatus> {
        IncidentStatus::ALL
            .iter()
            .copied()
            .find(|status| status.to_string() == value)
    }
}

impl Display for IncidentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::HospitalNotified => write!(f, "hospital_notified"),
            Self::HospitalAccepted => write!(f, "hospital_accepted"),
            Self::Assigned => write!(f, "assigned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Incident model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub reporter_id: String,
    pub location: Coordinate,
    pub description: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub injured_count: u32,
    pub vehicle_count: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for reporting a new incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIncident {
    pub reporter_id: String,
    pub location: Coordinate,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub injured_count: u32,
    #[serde(default)]
    pub vehicle_count: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
}

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-()]{5,19}$").expect("phone regex"));

impl NewIncident {
    pub fn validate(&self) -> Result<(), Error> {
        self.location.validate()?;

        if self.reporter_id.trim().is_empty() {
            return Err(Error::Validation("reporter_id must not be empty".into()));
        }
        if self.description.trim().is_empty() {
            return Err(Error::Validation("description must not be empty".into()));
        }
        if let Some(phone) = &self.contact_phone {
            if !PHONE_RE.is_match(phone) {
                return Err(Error::Validation(format!(
                    "contact_phone is not a usable phone number: {}",
                    phone
                )));
            }
        }

        Ok(())
    }

    pub fn into_incident(self, now: DateTime<Utc>) -> Incident {
        Incident {
            id: Uuid::new_v4(),
            reporter_id: self.reporter_id,
            location: self.location,
            description: self.description,
            severity: self.severity,
            status: IncidentStatus::Pending,
            injured_count: self.injured_count,
            vehicle_count: self.vehicle_count,
            notes: self.notes,
            contact_phone: self.contact_phone,
            created_at: now,
            updated_at: now,
        }
    }
}
