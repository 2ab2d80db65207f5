use crate::config::TrackingConfig;
use crate::db::document::DocumentStore;
use crate::db::models::assignment_models::{Assignment, AssignmentStatus, TripPhase};
use crate::db::models::incident_models::IncidentStatus;
use crate::db::models::notification_models::Notification;
use crate::db::repositories::{AssignmentsRepository, HospitalsRepository, IncidentsRepository};
use crate::error::{self, Error};
use crate::geo::{self, Coordinate};
use crate::messaging::event::{NotificationKind, RecipientKind};
use crate::messaging::NotifierTrait;
use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Distance from the destination at which a trip leg counts as arrived.
pub const ARRIVAL_RADIUS_KM: f64 = 0.1;

/// Outcome of one position ping.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingUpdate {
    pub assignment: Assignment,
    pub phase: Option<TripPhase>,
    pub distance_km: f64,
    pub eta_minutes: i64,
    pub near_destination: bool,
    pub auto_arrival: bool,
}

/// Tracking service following responder trips and driving arrivals
pub struct TrackingService {
    assignments_repo: AssignmentsRepository,
    incidents_repo: IncidentsRepository,
    hospitals_repo: HospitalsRepository,
    notifier: Arc<dyn NotifierTrait>,
    config: TrackingConfig,
    cas_retry_limit: u32,
}

impl TrackingService {
    /// Create a new tracking service
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn NotifierTrait>,
        config: TrackingConfig,
        cas_retry_limit: u32,
    ) -> Self {
        Self {
            assignments_repo: AssignmentsRepository::new(store.clone()),
            incidents_repo: IncidentsRepository::new(store.clone()),
            hospitals_repo: HospitalsRepository::new(store),
            notifier,
            config,
            cas_retry_limit,
        }
    }

    /// Record a responder position ping.
    ///
    /// The first ping of a fresh claim puts the responder en route and
    /// the incident in progress. Crossing into the arrival ring fires
    /// the same phase progression a manual request would; sitting
    /// inside the ring does not re-fire it. Pings for a completed trip
    /// are acknowledged without effect.
    pub async fn record_position(
        &self,
        assignment_id: Uuid,
        position: Coordinate,
    ) -> Result<TrackingUpdate> {
        position.validate()?;

        let current = self.assignments_repo.get_versioned(assignment_id).await?;
        let assignment = &current.record;

        match assignment.status {
            AssignmentStatus::Completed => {
                return Ok(TrackingUpdate {
                    assignment: assignment.clone(),
                    phase: Some(TripPhase::Completed),
                    distance_km: 0.0,
                    eta_minutes: 0,
                    near_destination: false,
                    auto_arrival: false,
                });
            }
            AssignmentStatus::Cancelled => {
                return Err(Error::invalid_transition(
                    "assignment",
                    assignment_id,
                    assignment.status,
                    AssignmentStatus::EnRoute,
                )
                .into());
            }
            _ => {}
        }

        let mut updated = assignment.clone();

        let started_moving = updated.status == AssignmentStatus::Accepted;
        if started_moving {
            updated.status = AssignmentStatus::EnRoute;
            info!(
                "Responder {} started moving on assignment {}",
                updated.responder_id, assignment_id
            );
        }

        let destination = self.destination_for(&updated).await?;
        let distance_km = geo::distance_km(position, destination);
        let eta = geo::eta_minutes(distance_km, self.config.average_speed_kmh);

        let near = distance_km <= ARRIVAL_RADIUS_KM;
        let arrival_edge = near && !assignment.near_destination;

        updated.last_location = Some(position);
        updated.eta_minutes = Some(eta);
        updated.near_destination = near;

        let saved = self.assignments_repo.save(&current, updated).await?;

        // The incident mirrors the trip from the moment the responder
        // is moving.
        if started_moving {
            self.transition_incident(saved.record.incident_id, IncidentStatus::InProgress)
                .await;
        }

        debug!(
            "Assignment {} at ({:.4}, {:.4}), {:.2} km from destination, eta {} min",
            assignment_id, position.latitude, position.longitude, distance_km, eta
        );

        if arrival_edge {
            let progressed = self.progress(assignment_id).await?;
            let phase = progressed.phase();
            return Ok(TrackingUpdate {
                assignment: progressed,
                phase,
                distance_km,
                eta_minutes: eta,
                near_destination: true,
                auto_arrival: true,
            });
        }

        let phase = saved.record.phase();
        Ok(TrackingUpdate {
            assignment: saved.record,
            phase,
            distance_km,
            eta_minutes: eta,
            near_destination: near,
            auto_arrival: false,
        })
    }

    /// Move a trip to its next leg. Scene arrival and hospital delivery
    /// both go through here, whether a position ping or a manual
    /// request asked for it. Progressing a completed trip changes
    /// nothing.
    pub async fn progress(&self, assignment_id: Uuid) -> Result<Assignment> {
        let current = self.assignments_repo.get_versioned(assignment_id).await?;
        let assignment = current.record.clone();

        match assignment.status {
            AssignmentStatus::Accepted | AssignmentStatus::EnRoute => {
                let mut updated = assignment.clone();
                updated.status = AssignmentStatus::Arrived;
                updated.near_destination = false;
                let saved = self.assignments_repo.save(&current, updated).await?;

                self.transition_incident(assignment.incident_id, IncidentStatus::InProgress)
                    .await;

                info!(
                    "Responder {} arrived at the scene of incident {}",
                    assignment.responder_id, assignment.incident_id
                );

                if let Ok(incident) = self.incidents_repo.get_by_id(assignment.incident_id).await {
                    self.try_notify(Notification::new(
                        RecipientKind::Reporter,
                        Some(incident.reporter_id),
                        Some(assignment.incident_id),
                        NotificationKind::ResponderArrived,
                        "Help has arrived at the scene",
                    ))
                    .await;
                }
                self.try_notify(Notification::new(
                    RecipientKind::Hospital,
                    Some(assignment.hospital_id.to_string()),
                    Some(assignment.incident_id),
                    NotificationKind::ResponderArrived,
                    format!(
                        "Responder {} picked up the patient, inbound to you",
                        assignment.responder_id
                    ),
                ))
                .await;

                Ok(saved.record)
            }
            AssignmentStatus::Arrived => {
                let mut updated = assignment.clone();
                updated.status = AssignmentStatus::Completed;
                updated.near_destination = false;
                updated.eta_minutes = Some(0);
                let saved = self.assignments_repo.save(&current, updated).await?;

                self.transition_incident(assignment.incident_id, IncidentStatus::Completed)
                    .await;

                info!(
                    "Assignment {} completed, patient delivered to hospital {}",
                    assignment_id, assignment.hospital_id
                );

                self.try_notify(Notification::new(
                    RecipientKind::Hospital,
                    Some(assignment.hospital_id.to_string()),
                    Some(assignment.incident_id),
                    NotificationKind::PatientDelivered,
                    "Patient has arrived at your facility",
                ))
                .await;
                if let Ok(incident) = self.incidents_repo.get_by_id(assignment.incident_id).await {
                    self.try_notify(Notification::new(
                        RecipientKind::Reporter,
                        Some(incident.reporter_id),
                        Some(assignment.incident_id),
                        NotificationKind::PatientDelivered,
                        "Patient delivered to the hospital",
                    ))
                    .await;
                }

                Ok(saved.record)
            }
            AssignmentStatus::Completed => Ok(assignment),
            AssignmentStatus::Cancelled => Err(Error::invalid_transition(
                "assignment",
                assignment_id,
                AssignmentStatus::Cancelled,
                AssignmentStatus::Arrived,
            )
            .into()),
        }
    }

    /// Destination of the current trip leg.
    async fn destination_for(&self, assignment: &Assignment) -> Result<Coordinate> {
        match assignment.phase() {
            Some(TripPhase::ToAccident) => {
                let incident = self.incidents_repo.get_by_id(assignment.incident_id).await?;
                Ok(incident.location)
            }
            Some(TripPhase::ToHospital) => {
                let hospital = self.hospitals_repo.get_by_id(assignment.hospital_id).await?;
                Ok(hospital.location)
            }
            Some(TripPhase::Completed) | None => Err(Error::Service(format!(
                "assignment {} has no active destination",
                assignment.id
            ))
            .into()),
        }
    }

    /// Drag the incident along with the trip. The assignment record is
    /// authoritative for the trip itself, so a failure here is logged
    /// rather than unwound.
    async fn transition_incident(&self, incident_id: Uuid, to: IncidentStatus) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = async {
                let current = self.incidents_repo.get_versioned(incident_id).await?;
                if current.record.status == to {
                    return Ok(current);
                }
                self.incidents_repo.update_status(&current, to).await
            }
            .await;

            match outcome {
                Ok(_) => return,
                Err(e) if error::is_conflict(&e) && attempts < self.cas_retry_limit => continue,
                Err(e) => {
                    warn!("Incident {} could not move to {}: {}", incident_id, to, e);
                    return;
                }
            }
        }
    }

    async fn try_notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            warn!("Notification delivery failed: {}", e);
        }
    }
}
