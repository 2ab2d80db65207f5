use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::error::Error;
use crate::geo::Coordinate;

/// Hospital model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hospital {
    pub id: Uuid,
    pub name: String,
    pub location: Coordinate,
    #[serde(default)]
    pub available_beds: u32,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for registering a hospital.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHospital {
    pub name: String,
    pub location: Coordinate,
    #[serde(default)]
    pub available_beds: u32,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
}

impl NewHospital {
    pub fn validate(&self) -> Result<(), Error> {
        self.location.validate()?;
        if self.name.trim().is_empty() {
            return Err(Error::Validation("hospital name must not be empty".into()));
        }
        Ok(())
    }

    pub fn into_hospital(self, now: DateTime<Utc>) -> Hospital {
        Hospital {
            id: Uuid::new_v4(),
            name: self.name,
            location: self.location,
            available_beds: self.available_beds,
            specialties: self.specialties,
            contact_phone: self.contact_phone,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Hospital's answer to an incident it was notified about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResponseDecision {
    Accepted,
    Rejected,
}

impl Display for ResponseDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Payload a hospital submits when answering an incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHospitalResponse {
    pub hospital_id: Uuid,
    pub decision: ResponseDecision,
    #[serde(default)]
    pub beds_offered: Option<u32>,
    #[serde(default)]
    pub eta_minutes: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Specialty services the hospital offers for this incident.
    #[serde(default)]
    pub specialties: Vec<String>,
}

/// Hospital response model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HospitalResponse {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub hospital_id: Uuid,
    pub hospital_name: String,
    pub decision: ResponseDecision,
    #[serde(default)]
    pub beds_offered: Option<u32>,
    #[serde(default)]
    pub eta_minutes: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
    pub created_at: DateTime<Utc>,
}
