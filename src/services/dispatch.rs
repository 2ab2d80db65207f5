use crate::config::DispatchConfig;
use crate::db::document::DocumentStore;
use crate::db::models::assignment_models::{Assignment, AssignmentStatus, RejectionRecord};
use crate::db::models::hospital_models::{HospitalResponse, NewHospitalResponse, ResponseDecision};
use crate::db::models::incident_models::{Incident, IncidentStatus, NewIncident};
use crate::db::models::notification_models::Notification;
use crate::db::repositories::{
    AssignmentsRepository, HospitalResponsesRepository, HospitalsRepository, IncidentsRepository,
    NotificationsRepository,
};
use crate::error::{self, Error};
use crate::messaging::event::{NotificationKind, RecipientKind};
use crate::messaging::NotifierTrait;
use crate::services::matching::MatchingService;
use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Dispatch service driving the incident and assignment state machines
pub struct DispatchService {
    incidents_repo: IncidentsRepository,
    hospitals_repo: HospitalsRepository,
    responses_repo: HospitalResponsesRepository,
    assignments_repo: AssignmentsRepository,
    notifications_repo: NotificationsRepository,
    matching: Arc<MatchingService>,
    notifier: Arc<dyn NotifierTrait>,
    config: DispatchConfig,
}

impl DispatchService {
    /// Create a new dispatch service
    pub fn new(
        store: Arc<dyn DocumentStore>,
        matching: Arc<MatchingService>,
        notifier: Arc<dyn NotifierTrait>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            incidents_repo: IncidentsRepository::new(store.clone()),
            hospitals_repo: HospitalsRepository::new(store.clone()),
            responses_repo: HospitalResponsesRepository::new(store.clone()),
            assignments_repo: AssignmentsRepository::new(store.clone()),
            notifications_repo: NotificationsRepository::new(store),
            matching,
            notifier,
            config,
        }
    }

    /// Report a new incident and alert hospitals in range.
    ///
    /// The incident is persisted first; everything after that is
    /// advisory and can fail without undoing the report. With no
    /// hospital in range (even after widening the search) the incident
    /// simply stays pending.
    pub async fn report_incident(&self, new_incident: NewIncident) -> Result<Incident> {
        let incident = self.incidents_repo.create(new_incident).await?;
        info!(
            "Incident {} reported by {} ({}, {} injured)",
            incident.id, incident.reporter_id, incident.severity, incident.injured_count
        );

        self.try_notify(Notification::new(
            RecipientKind::Reporter,
            Some(incident.reporter_id.clone()),
            Some(incident.id),
            NotificationKind::IncidentReported,
            format!(
                "Emergency received at ({:.4}, {:.4}), searching for hospitals",
                incident.location.latitude, incident.location.longitude
            ),
        ))
        .await;

        match self.notify_nearby_hospitals(incident.clone()).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                error!(
                    "Hospital alert cascade failed for incident {}: {}",
                    incident.id, e
                );
                Ok(incident)
            }
        }
    }

    /// Find hospitals for a pending incident and tell them about it.
    /// Returns the incident as it stands afterwards.
    async fn notify_nearby_hospitals(&self, incident: Incident) -> Result<Incident> {
        let (matches, radius) = self.matching.hospitals_for_incident(&incident).await?;

        if matches.is_empty() {
            warn!(
                "No hospitals within {} km of incident {}, leaving it pending",
                radius, incident.id
            );
            return Ok(incident);
        }

        let mut attempts = 0;
        let updated = loop {
            attempts += 1;
            let current = self.incidents_repo.get_versioned(incident.id).await?;

            // A hospital may have found the incident through the nearby
            // query and accepted it already; keep that progress.
            if current.record.status != IncidentStatus::Pending {
                break current.record;
            }

            match self
                .incidents_repo
                .update_status(&current, IncidentStatus::HospitalNotified)
                .await
            {
                Ok(v) => break v.record,
                Err(e) if error::is_conflict(&e) && attempts < self.config.cas_retry_limit => {
                    continue
                }
                Err(e) => return Err(e),
            }
        };

        futures_util::future::join_all(matches.iter().map(|m| {
            self.try_notify(Notification::new(
                RecipientKind::Hospital,
                Some(m.hospital.id.to_string()),
                Some(updated.id),
                NotificationKind::HospitalNotified,
                format!(
                    "{} emergency {:.1} km away: {}",
                    updated.severity, m.distance_km, updated.description
                ),
            ))
        }))
        .await;

        info!(
            "Alerted {} hospitals within {} km about incident {}",
            matches.len(),
            radius,
            updated.id
        );

        Ok(updated)
    }

    /// Delete an incident that has not progressed past hospital
    /// notification, then sweep its notifications.
    pub async fn delete_incident(&self, incident_id: Uuid) -> Result<Incident> {
        let removed = self.incidents_repo.delete(incident_id).await?;
        info!("Incident {} deleted while {}", removed.id, removed.status);

        // The incident itself is already gone; cleanup failures only log.
        match self
            .notifications_repo
            .delete_for_incident(incident_id)
            .await
        {
            Ok(count) => debug!(
                "Removed {} notifications for deleted incident {}",
                count, incident_id
            ),
            Err(e) => warn!(
                "Failed to clean up notifications for deleted incident {}: {}",
                incident_id, e
            ),
        }

        Ok(removed)
    }

    /// Record a hospital's answer to an incident. An acceptance moves
    /// the incident to `hospital_accepted` and opens it for responder
    /// claims; further acceptances accumulate without another
    /// transition.
    pub async fn hospital_respond(
        &self,
        incident_id: Uuid,
        answer: NewHospitalResponse,
    ) -> Result<HospitalResponse> {
        let incident = self.incidents_repo.get_by_id(incident_id).await?;
        let hospital = self.hospitals_repo.get_by_id(answer.hospital_id).await?;

        match answer.decision {
            ResponseDecision::Accepted => {
                self.accept_transition(incident_id).await?;
            }
            ResponseDecision::Rejected => {
                if incident.status.is_terminal() {
                    return Err(Error::Validation(format!(
                        "incident {} is {} and no longer accepts responses",
                        incident_id, incident.status
                    ))
                    .into());
                }
            }
        }

        let response = self
            .responses_repo
            .create(incident_id, &hospital.name, answer)
            .await?;

        info!(
            "Hospital {} {} incident {}",
            hospital.name, response.decision, incident_id
        );

        match response.decision {
            ResponseDecision::Accepted => {
                let message = match response.beds_offered {
                    Some(beds) => format!(
                        "{} accepted your emergency ({} beds ready)",
                        hospital.name, beds
                    ),
                    None => format!("{} accepted your emergency", hospital.name),
                };
                self.try_notify(Notification::new(
                    RecipientKind::Reporter,
                    Some(incident.reporter_id.clone()),
                    Some(incident_id),
                    NotificationKind::HospitalAccepted,
                    message,
                ))
                .await;

                self.try_notify(Notification::new(
                    RecipientKind::Responder,
                    None,
                    Some(incident_id),
                    NotificationKind::IncidentClaimable,
                    format!(
                        "{} emergency at ({:.4}, {:.4}) has a receiving hospital, awaiting a responder",
                        incident.severity,
                        incident.location.latitude,
                        incident.location.longitude
                    ),
                ))
                .await;
            }
            ResponseDecision::Rejected => {
                let message = match &response.reason {
                    Some(reason) => {
                        format!("{} cannot take this patient: {}", hospital.name, reason)
                    }
                    None => format!("{} cannot take this patient", hospital.name),
                };
                self.try_notify(Notification::new(
                    RecipientKind::Reporter,
                    Some(incident.reporter_id.clone()),
                    Some(incident_id),
                    NotificationKind::HospitalRejected,
                    message,
                ))
                .await;
            }
        }

        Ok(response)
    }

    /// Drive an incident to `hospital_accepted`, tolerating a
    /// concurrent acceptance that got there first.
    async fn accept_transition(&self, incident_id: Uuid) -> Result<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.incidents_repo.get_versioned(incident_id).await?;

            match current.record.status {
                IncidentStatus::Pending | IncidentStatus::HospitalNotified => {
                    match self
                        .incidents_repo
                        .update_status(&current, IncidentStatus::HospitalAccepted)
                        .await
                    {
                        Ok(_) => return Ok(()),
                        Err(e)
                            if error::is_conflict(&e)
                                && attempts < self.config.cas_retry_limit =>
                        {
                            continue
                        }
                        Err(e) => return Err(e),
                    }
                }
                IncidentStatus::HospitalAccepted => return Ok(()),
                other => {
                    return Err(Error::invalid_transition(
                        "incident",
                        incident_id,
                        other,
                        IncidentStatus::HospitalAccepted,
                    )
                    .into())
                }
            }
        }
    }

    /// Claim an incident for a responder. Exactly one of any number of
    /// concurrent claimers wins; the rest get a conflict.
    ///
    /// The named hospital must be among those that accepted the
    /// incident, and the claim only commits if the incident document is
    /// untouched since it was read here.
    pub async fn accept_by_responder(
        &self,
        incident_id: Uuid,
        responder_id: &str,
        hospital_id: Uuid,
    ) -> Result<Assignment> {
        if responder_id.trim().is_empty() {
            return Err(Error::Validation("responder_id must not be empty".into()).into());
        }

        let current = self.incidents_repo.get_versioned(incident_id).await?;

        if current.record.status != IncidentStatus::HospitalAccepted {
            return Err(Error::invalid_transition(
                "incident",
                incident_id,
                current.record.status,
                IncidentStatus::Assigned,
            )
            .into());
        }

        if !self
            .responses_repo
            .hospital_has_accepted(incident_id, hospital_id)
            .await?
        {
            return Err(Error::Validation(format!(
                "hospital {} has not accepted incident {}",
                hospital_id, incident_id
            ))
            .into());
        }

        if self
            .assignments_repo
            .active_for_incident(incident_id)
            .await?
            .is_some()
        {
            return Err(Error::conflict("assignments", incident_id).into());
        }

        let assignment = Assignment::new(incident_id, responder_id.to_string(), hospital_id);
        self.assignments_repo.create(&assignment).await?;

        // The version read above is the claim ticket: if anyone touched
        // the incident since, this swap loses and the claim is withdrawn.
        if let Err(e) = self
            .incidents_repo
            .update_status(&current, IncidentStatus::Assigned)
            .await
        {
            if let Err(cleanup) = self.assignments_repo.discard(assignment.id).await {
                error!(
                    "Failed to withdraw losing claim {}: {}",
                    assignment.id, cleanup
                );
            }
            if error::is_conflict(&e) {
                debug!(
                    "Responder {} lost the claim race for incident {}",
                    responder_id, incident_id
                );
            }
            return Err(e);
        }

        info!(
            "Responder {} assigned to incident {} (assignment {})",
            responder_id, incident_id, assignment.id
        );

        self.try_notify(Notification::new(
            RecipientKind::Reporter,
            Some(current.record.reporter_id.clone()),
            Some(incident_id),
            NotificationKind::ResponderAssigned,
            format!("Responder {} is on the way", responder_id),
        ))
        .await;
        self.try_notify(Notification::new(
            RecipientKind::Hospital,
            Some(hospital_id.to_string()),
            Some(incident_id),
            NotificationKind::ResponderAssigned,
            format!(
                "Responder {} will transport the patient to you",
                responder_id
            ),
        ))
        .await;

        Ok(assignment)
    }

    /// Record a responder declining an incident. The incident is left
    /// untouched and stays claimable by everyone else.
    pub async fn reject_by_responder(
        &self,
        incident_id: Uuid,
        responder_id: &str,
        reason: Option<String>,
    ) -> Result<RejectionRecord> {
        if responder_id.trim().is_empty() {
            return Err(Error::Validation("responder_id must not be empty".into()).into());
        }

        let incident = self.incidents_repo.get_by_id(incident_id).await?;
        if incident.status.is_terminal() {
            return Err(Error::Validation(format!(
                "incident {} is {} and no longer dispatchable",
                incident_id, incident.status
            ))
            .into());
        }

        let rejection = self
            .assignments_repo
            .record_rejection(incident_id, responder_id, reason)
            .await?;

        debug!(
            "Responder {} declined incident {}, incident stays claimable",
            responder_id, incident_id
        );

        Ok(rejection)
    }

    /// Cancel an assignment and put its incident back up for claims.
    /// The reason is mandatory.
    pub async fn cancel_assignment(&self, assignment_id: Uuid, reason: &str) -> Result<Assignment> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::Validation("cancellation reason must not be empty".into()).into());
        }

        let mut attempts = 0;
        let cancelled = loop {
            attempts += 1;
            let current = self.assignments_repo.get_versioned(assignment_id).await?;

            if current.record.status.is_terminal() {
                return Err(Error::invalid_transition(
                    "assignment",
                    assignment_id,
                    current.record.status,
                    AssignmentStatus::Cancelled,
                )
                .into());
            }

            let mut updated = current.record.clone();
            updated.status = AssignmentStatus::Cancelled;
            updated.cancel_reason = Some(reason.to_string());
            updated.cancelled_at = Some(Utc::now());

            match self.assignments_repo.save(&current, updated).await {
                Ok(v) => break v.record,
                Err(e) if error::is_conflict(&e) && attempts < self.config.cas_retry_limit => {
                    warn!(
                        "Retrying cancellation of assignment {} after a concurrent update",
                        assignment_id
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        info!("Assignment {} cancelled: {}", assignment_id, reason);

        self.rollback_incident(cancelled.incident_id).await?;

        let notice = format!("Responder assignment cancelled: {}", reason);
        self.try_notify(Notification::new(
            RecipientKind::Hospital,
            Some(cancelled.hospital_id.to_string()),
            Some(cancelled.incident_id),
            NotificationKind::AssignmentCancelled,
            notice.clone(),
        ))
        .await;
        if let Ok(incident) = self.incidents_repo.get_by_id(cancelled.incident_id).await {
            self.try_notify(Notification::new(
                RecipientKind::Reporter,
                Some(incident.reporter_id),
                Some(cancelled.incident_id),
                NotificationKind::AssignmentCancelled,
                notice,
            ))
            .await;
        }

        Ok(cancelled)
    }

    /// Return a cancelled assignment's incident to `hospital_accepted`
    /// so it can be rematched.
    async fn rollback_incident(&self, incident_id: Uuid) -> Result<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.incidents_repo.get_versioned(incident_id).await?;

            if current.record.status == IncidentStatus::HospitalAccepted {
                return Ok(());
            }
            if !current.record.status.can_rollback_to_accepted() {
                warn!(
                    "Incident {} is {} and was not rolled back",
                    incident_id, current.record.status
                );
                return Ok(());
            }

            match self.incidents_repo.rollback_to_accepted(&current).await {
                Ok(_) => {
                    info!(
                        "Incident {} rolled back to hospital_accepted for rematching",
                        incident_id
                    );
                    return Ok(());
                }
                Err(e) if error::is_conflict(&e) && attempts < self.config.cas_retry_limit => {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Cancel an incident outright, taking any live assignment down
    /// with it.
    pub async fn cancel_incident(
        &self,
        incident_id: Uuid,
        reason: Option<String>,
    ) -> Result<Incident> {
        let mut attempts = 0;
        let cancelled = loop {
            attempts += 1;
            let current = self.incidents_repo.get_versioned(incident_id).await?;

            match self
                .incidents_repo
                .update_status(&current, IncidentStatus::Cancelled)
                .await
            {
                Ok(v) => break v.record,
                Err(e) if error::is_conflict(&e) && attempts < self.config.cas_retry_limit => {
                    continue
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            "Incident {} cancelled{}",
            incident_id,
            reason
                .as_deref()
                .map(|r| format!(": {}", r))
                .unwrap_or_default()
        );

        // The trip is over as well; failures here only log because the
        // incident is already terminally cancelled.
        match self.assignments_repo.active_for_incident(incident_id).await {
            Ok(Some(active)) => {
                let outcome = async {
                    let current = self.assignments_repo.get_versioned(active.id).await?;
                    let mut updated = current.record.clone();
                    updated.status = AssignmentStatus::Cancelled;
                    updated.cancel_reason = Some("incident cancelled".into());
                    updated.cancelled_at = Some(Utc::now());
                    self.assignments_repo.save(&current, updated).await
                }
                .await;

                if let Err(e) = outcome {
                    warn!(
                        "Failed to cancel assignment {} of cancelled incident {}: {}",
                        active.id, incident_id, e
                    );
                }
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Failed to look up assignments of cancelled incident {}: {}",
                incident_id, e
            ),
        }

        let notice = match &reason {
            Some(r) => format!("Incident was cancelled: {}", r),
            None => "Incident was cancelled".to_string(),
        };

        self.try_notify(Notification::new(
            RecipientKind::Reporter,
            Some(cancelled.reporter_id.clone()),
            Some(incident_id),
            NotificationKind::IncidentCancelled,
            notice.clone(),
        ))
        .await;

        if let Ok(accepted) = self.responses_repo.accepted_for_incident(incident_id).await {
            futures_util::future::join_all(accepted.iter().map(|response| {
                self.try_notify(Notification::new(
                    RecipientKind::Hospital,
                    Some(response.hospital_id.to_string()),
                    Some(incident_id),
                    NotificationKind::IncidentCancelled,
                    notice.clone(),
                ))
            }))
            .await;
        }

        Ok(cancelled)
    }

    /// Delivery is advisory: failures are logged and dispatch state
    /// stands.
    async fn try_notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            warn!("Notification delivery failed: {}", e);
        }
    }
}
