use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Notification kinds emitted by the dispatch engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    // Incident lifecycle
    IncidentReported,
    IncidentCancelled,

    // Hospital coordination
    HospitalNotified,
    HospitalAccepted,
    HospitalRejected,

    // Responder coordination
    IncidentClaimable,
    ResponderAssigned,
    AssignmentCancelled,
    ResponderArrived,
    PatientDelivered,

    // Sensor pipeline
    SensorEmergency,

    // Custom notification
    Custom(String),
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncidentReported => write!(f, "incident.reported"),
            Self::IncidentCancelled => write!(f, "incident.cancelled"),
            Self::HospitalNotified => write!(f, "hospital.notified"),
            Self::HospitalAccepted => write!(f, "hospital.accepted"),
            Self::HospitalRejected => write!(f, "hospital.rejected"),
            Self::IncidentClaimable => write!(f, "incident.claimable"),
            Self::ResponderAssigned => write!(f, "responder.assigned"),
            Self::AssignmentCancelled => write!(f, "assignment.cancelled"),
            Self::ResponderArrived => write!(f, "responder.arrived"),
            Self::PatientDelivered => write!(f, "patient.delivered"),
            Self::SensorEmergency => write!(f, "sensor.emergency"),
            Self::Custom(name) => write!(f, "custom.{}", name),
        }
    }
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    Reporter,
    Hospital,
    Responder,
}

impl Display for RecipientKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reporter => write!(f, "reporter"),
            Self::Hospital => write!(f, "hospital"),
            Self::Responder => write!(f, "responder"),
        }
    }
}
