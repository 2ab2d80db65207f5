#[cfg(test)]
mod tests {
    use crate::config::{DetectorConfig, DispatchConfig, MatchingConfig, TrackingConfig};
    use crate::db::memory::MemoryStore;
    use crate::db::models::assignment_models::{Assignment, AssignmentStatus, TripPhase};
    use crate::db::models::detection_models::{Axes, DetectionStatus, SensorSnapshot, TriggerKind};
    use crate::db::models::hospital_models::{
        Hospital, NewHospital, NewHospitalResponse, ResponseDecision,
    };
    use crate::db::models::incident_models::{Incident, IncidentStatus, NewIncident, Severity};
    use crate::db::models::notification_models::Notification;
    use crate::db::repositories::Repositories;
    use crate::error::{self, Error};
    use crate::geo::Coordinate;
    use crate::messaging::event::NotificationKind;
    use crate::messaging::notifier::create_notifier;
    use crate::messaging::NotifierTrait;
    use crate::services::detector::{ChannelTelemetrySource, SensorDetector, SensorMonitor};
    use crate::services::dispatch::DispatchService;
    use crate::services::matching::MatchingService;
    use crate::services::tracking::TrackingService;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    struct World {
        repos: Repositories,
        dispatch: Arc<DispatchService>,
        tracking: TrackingService,
    }

    fn world() -> World {
        world_with_notifier(None)
    }

    fn world_with_notifier(notifier: Option<Arc<dyn NotifierTrait>>) -> World {
        let store = MemoryStore::shared();
        let repos = Repositories::new(store.clone());
        let notifier: Arc<dyn NotifierTrait> =
            notifier.unwrap_or_else(|| create_notifier(repos.notifications.clone()));
        let matching = Arc::new(MatchingService::new(
            store.clone(),
            MatchingConfig::default(),
        ));
        let dispatch = Arc::new(DispatchService::new(
            store.clone(),
            matching,
            notifier.clone(),
            DispatchConfig::default(),
        ));
        let tracking = TrackingService::new(store, notifier, TrackingConfig::default(), 3);

        World {
            repos,
            dispatch,
            tracking,
        }
    }

    /// A notifier whose delivery channel is down.
    struct FailingNotifier;

    #[async_trait]
    impl NotifierTrait for FailingNotifier {
        async fn notify(&self, _notification: Notification) -> Result<()> {
            Err(Error::Notification("delivery channel down".into()).into())
        }

        async fn subscribe(
            &self,
            _kind: NotificationKind,
            _callback: crate::messaging::notifier::NotificationCallback,
        ) -> Result<Uuid> {
            Err(Error::Notification("delivery channel down".into()).into())
        }

        async fn subscribe_incident(
            &self,
            _incident_id: Uuid,
            _callback: crate::messaging::notifier::NotificationCallback,
        ) -> Result<Uuid> {
            Err(Error::Notification("delivery channel down".into()).into())
        }

        async fn subscribe_all(
            &self,
            _callback: crate::messaging::notifier::NotificationCallback,
        ) -> Result<Uuid> {
            Err(Error::Notification("delivery channel down".into()).into())
        }

        async fn unsubscribe(&self, _subscription_id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    fn mumbai() -> Coordinate {
        Coordinate::new(19.0760, 72.8777)
    }

    // Roughly 8.6 km from the scene.
    fn hospital_location() -> Coordinate {
        Coordinate::new(19.0033, 72.8416)
    }

    // Roughly 70 km north of the scene: outside the first ring, inside
    // the widened one.
    fn distant_hospital_location() -> Coordinate {
        Coordinate::new(19.7060, 72.8777)
    }

    fn report_at(location: Coordinate) -> NewIncident {
        NewIncident {
            reporter_id: "user-17".into(),
            location,
            description: "two-car collision, one person trapped".into(),
            severity: Severity::High,
            injured_count: 2,
            vehicle_count: 2,
            notes: None,
            contact_phone: Some("+91 98200 12345".into()),
        }
    }

    fn hospital_at(name: &str, location: Coordinate) -> NewHospital {
        NewHospital {
            name: name.into(),
            location,
            available_beds: 12,
            specialties: vec!["trauma".into()],
            contact_phone: None,
        }
    }

    fn acceptance(hospital_id: Uuid) -> NewHospitalResponse {
        NewHospitalResponse {
            hospital_id,
            decision: ResponseDecision::Accepted,
            beds_offered: Some(2),
            eta_minutes: Some(15),
            reason: None,
            specialties: vec!["trauma".into()],
        }
    }

    async fn accepted_incident(world: &World) -> (Incident, Hospital) {
        let hospital = world
            .repos
            .hospitals
            .create(hospital_at("City General", hospital_location()))
            .await
            .unwrap();
        let incident = world
            .dispatch
            .report_incident(report_at(mumbai()))
            .await
            .unwrap();
        world
            .dispatch
            .hospital_respond(incident.id, acceptance(hospital.id))
            .await
            .unwrap();

        let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        (incident, hospital)
    }

    async fn assigned_incident(world: &World) -> (Incident, Hospital, Assignment) {
        let (incident, hospital) = accepted_incident(world).await;
        let assignment = world
            .dispatch
            .accept_by_responder(incident.id, "resp-1", hospital.id)
            .await
            .unwrap();
        let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        (incident, hospital, assignment)
    }

    #[tokio::test]
    async fn report_notifies_hospitals_in_range() {
        let world = world();
        let hospital = world
            .repos
            .hospitals
            .create(hospital_at("City General", hospital_location()))
            .await
            .unwrap();

        let incident = world
            .dispatch
            .report_incident(report_at(mumbai()))
            .await
            .unwrap();

        assert_eq!(incident.status, IncidentStatus::HospitalNotified);

        let inbox = world
            .repos
            .notifications
            .get_for_recipient(
                crate::messaging::event::RecipientKind::Hospital,
                &hospital.id.to_string(),
            )
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::HospitalNotified);
    }

    #[tokio::test]
    async fn report_widens_to_fallback_radius() {
        let world = world();
        world
            .repos
            .hospitals
            .create(hospital_at("Upstate Medical", distant_hospital_location()))
            .await
            .unwrap();

        let incident = world
            .dispatch
            .report_incident(report_at(mumbai()))
            .await
            .unwrap();

        assert_eq!(incident.status, IncidentStatus::HospitalNotified);
    }

    #[tokio::test]
    async fn report_with_no_hospitals_stays_pending() {
        let world = world();

        let incident = world
            .dispatch
            .report_incident(report_at(mumbai()))
            .await
            .unwrap();

        assert_eq!(incident.status, IncidentStatus::Pending);
    }

    #[tokio::test]
    async fn hospital_acceptance_opens_the_incident_for_claims() {
        let world = world();
        let (incident, hospital) = accepted_incident(&world).await;

        assert_eq!(incident.status, IncidentStatus::HospitalAccepted);

        let responses = world
            .repos
            .hospital_responses
            .get_for_incident(incident.id)
            .await
            .unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].hospital_id, hospital.id);

        // Responders got the open-for-claims broadcast.
        let all = world.repos.notifications.get_all().await.unwrap();
        assert!(all
            .iter()
            .any(|n| n.kind == NotificationKind::IncidentClaimable));
    }

    #[tokio::test]
    async fn further_acceptances_accumulate_without_a_transition() {
        let world = world();
        let (incident, _) = accepted_incident(&world).await;

        let second = world
            .repos
            .hospitals
            .create(hospital_at("Northside Clinic", hospital_location()))
            .await
            .unwrap();
        world
            .dispatch
            .hospital_respond(incident.id, acceptance(second.id))
            .await
            .unwrap();

        let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::HospitalAccepted);

        let accepted = world
            .repos
            .hospital_responses
            .accepted_for_incident(incident.id)
            .await
            .unwrap();
        assert_eq!(accepted.len(), 2);
    }

    #[tokio::test]
    async fn acceptance_after_assignment_is_rejected() {
        let world = world();
        let (incident, _, _) = assigned_incident(&world).await;

        let late = world
            .repos
            .hospitals
            .create(hospital_at("Latecomer Hospital", hospital_location()))
            .await
            .unwrap();

        let err = world
            .dispatch
            .hospital_respond(incident.id, acceptance(late.id))
            .await
            .unwrap_err();
        assert!(error::is_invalid_transition(&err));
        assert!(err.to_string().contains("assigned"), "{}", err);
    }

    #[tokio::test]
    async fn claim_requires_an_accepting_hospital() {
        let world = world();
        let (incident, _) = accepted_incident(&world).await;

        let silent = world
            .repos
            .hospitals
            .create(hospital_at("Silent Hospital", hospital_location()))
            .await
            .unwrap();

        let err = world
            .dispatch
            .accept_by_responder(incident.id, "resp-1", silent.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn claim_on_unclaimable_incident_names_its_status() {
        let world = world();
        let hospital = world
            .repos
            .hospitals
            .create(hospital_at("City General", hospital_location()))
            .await
            .unwrap();
        let incident = world
            .dispatch
            .report_incident(report_at(mumbai()))
            .await
            .unwrap();

        let err = world
            .dispatch
            .accept_by_responder(incident.id, "resp-1", hospital.id)
            .await
            .unwrap_err();
        assert!(error::is_invalid_transition(&err));
        assert!(err.to_string().contains("hospital_notified"), "{}", err);
    }

    #[tokio::test]
    async fn exactly_one_racer_wins_the_claim() {
        let world = world();
        let (incident, hospital) = accepted_incident(&world).await;

        let racers = 8;
        let outcomes = futures_util::future::join_all((0..racers).map(|n| {
            let dispatch = world.dispatch.clone();
            let responder = format!("resp-{}", n);
            async move {
                dispatch
                    .accept_by_responder(incident.id, &responder, hospital.id)
                    .await
            }
        }))
        .await;

        let wins = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(wins, 1, "exactly one concurrent claim may win");

        for outcome in &outcomes {
            if let Err(e) = outcome {
                assert!(
                    error::is_conflict(e) || error::is_invalid_transition(e),
                    "unexpected loser error: {}",
                    e
                );
            }
        }

        let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::Assigned);

        // Losing claims were withdrawn.
        let assignments = world.repos.assignments.get_all().await.unwrap();
        assert_eq!(assignments.len(), 1);
    }

    #[tokio::test]
    async fn rejection_keeps_the_incident_claimable() {
        let world = world();
        let (incident, hospital) = accepted_incident(&world).await;

        world
            .dispatch
            .reject_by_responder(incident.id, "resp-1", Some("too far out".into()))
            .await
            .unwrap();

        let unchanged = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        assert_eq!(unchanged.status, IncidentStatus::HospitalAccepted);

        let rejections = world
            .repos
            .assignments
            .rejections_for_incident(incident.id)
            .await
            .unwrap();
        assert_eq!(rejections.len(), 1);

        // Anyone else, including the rejector, can still claim it.
        world
            .dispatch
            .accept_by_responder(incident.id, "resp-2", hospital.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn assignment_cancellation_requires_a_reason() {
        let world = world();
        let (_, _, assignment) = assigned_incident(&world).await;

        let err = world
            .dispatch
            .cancel_assignment(assignment.id, "   ")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn cancellation_rolls_back_from_every_trip_phase() {
        for pings in [0usize, 1, 2] {
            let world = world();
            let (incident, hospital, assignment) = assigned_incident(&world).await;

            if pings >= 1 {
                world
                    .tracking
                    .record_position(assignment.id, Coordinate::new(19.3460, 72.8777))
                    .await
                    .unwrap();
            }
            if pings >= 2 {
                // At the scene: arrival fires, trip switches legs.
                world
                    .tracking
                    .record_position(assignment.id, mumbai())
                    .await
                    .unwrap();
            }

            let cancelled = world
                .dispatch
                .cancel_assignment(assignment.id, "vehicle breakdown")
                .await
                .unwrap();
            assert_eq!(cancelled.status, AssignmentStatus::Cancelled);
            assert_eq!(cancelled.cancel_reason.as_deref(), Some("vehicle breakdown"));
            assert!(cancelled.cancelled_at.is_some());

            let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
            assert_eq!(
                incident.status,
                IncidentStatus::HospitalAccepted,
                "after {} pings the incident must be claimable again",
                pings
            );

            // And it really is claimable again.
            world
                .dispatch
                .accept_by_responder(incident.id, "resp-9", hospital.id)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn completed_assignment_cannot_be_cancelled() {
        let world = world();
        let (_, _, assignment) = assigned_incident(&world).await;

        world.tracking.progress(assignment.id).await.unwrap();
        world.tracking.progress(assignment.id).await.unwrap();

        let err = world
            .dispatch
            .cancel_assignment(assignment.id, "changed my mind")
            .await
            .unwrap_err();
        assert!(error::is_invalid_transition(&err));
        assert!(err.to_string().contains("completed"), "{}", err);
    }

    #[tokio::test]
    async fn cancelling_an_incident_takes_its_assignment_down() {
        let world = world();
        let (incident, _, assignment) = assigned_incident(&world).await;

        world
            .tracking
            .record_position(assignment.id, Coordinate::new(19.3460, 72.8777))
            .await
            .unwrap();

        let cancelled = world
            .dispatch
            .cancel_incident(incident.id, Some("false alarm".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, IncidentStatus::Cancelled);

        let assignment = world
            .repos
            .assignments
            .get_by_id(assignment.id)
            .await
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_a_terminal_incident_is_rejected() {
        let world = world();
        let (incident, _, _) = assigned_incident(&world).await;

        world
            .dispatch
            .cancel_incident(incident.id, None)
            .await
            .unwrap();

        let err = world
            .dispatch
            .cancel_incident(incident.id, None)
            .await
            .unwrap_err();
        assert!(error::is_invalid_transition(&err));
    }

    #[tokio::test]
    async fn notification_failures_never_block_transitions() {
        let world = world_with_notifier(Some(Arc::new(FailingNotifier)));
        let hospital = world
            .repos
            .hospitals
            .create(hospital_at("City General", hospital_location()))
            .await
            .unwrap();

        let incident = world
            .dispatch
            .report_incident(report_at(mumbai()))
            .await
            .unwrap();
        assert_eq!(incident.status, IncidentStatus::HospitalNotified);

        world
            .dispatch
            .hospital_respond(incident.id, acceptance(hospital.id))
            .await
            .unwrap();
        let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::HospitalAccepted);

        let assignment = world
            .dispatch
            .accept_by_responder(incident.id, "resp-1", hospital.id)
            .await
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Accepted);
    }

    #[tokio::test]
    async fn deleting_an_incident_sweeps_its_notifications() {
        let world = world();
        world
            .repos
            .hospitals
            .create(hospital_at("City General", hospital_location()))
            .await
            .unwrap();

        let incident = world
            .dispatch
            .report_incident(report_at(mumbai()))
            .await
            .unwrap();
        assert!(!world
            .repos
            .notifications
            .get_for_incident(incident.id)
            .await
            .unwrap()
            .is_empty());

        world.dispatch.delete_incident(incident.id).await.unwrap();

        assert!(world
            .repos
            .notifications
            .get_for_incident(incident.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_is_refused_after_acceptance() {
        let world = world();
        let (incident, _) = accepted_incident(&world).await;

        let err = world.dispatch.delete_incident(incident.id).await.unwrap_err();
        assert!(error::is_invalid_transition(&err));
        assert!(err.to_string().contains("hospital_accepted"), "{}", err);
    }

    #[tokio::test]
    async fn first_ping_puts_the_responder_en_route() {
        let world = world();
        let (incident, _, assignment) = assigned_incident(&world).await;

        // 30 km north of the scene.
        let update = world
            .tracking
            .record_position(assignment.id, Coordinate::new(19.3460, 72.8777))
            .await
            .unwrap();

        assert_eq!(update.assignment.status, AssignmentStatus::EnRoute);
        assert_eq!(update.phase, Some(TripPhase::ToAccident));
        assert!((update.distance_km - 30.0).abs() < 0.2, "{}", update.distance_km);
        assert_eq!(update.eta_minutes, 45);
        assert!(!update.near_destination);
        assert!(!update.auto_arrival);

        // The incident mirrors the moving trip.
        let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::InProgress);
    }

    #[tokio::test]
    async fn arrival_fires_once_on_the_ring_edge() {
        let world = world();
        let (incident, _, assignment) = assigned_incident(&world).await;

        world
            .tracking
            .record_position(assignment.id, Coordinate::new(19.3460, 72.8777))
            .await
            .unwrap();

        // Crossing into the ring around the scene.
        let arrival = world
            .tracking
            .record_position(assignment.id, mumbai())
            .await
            .unwrap();
        assert!(arrival.auto_arrival);
        assert_eq!(arrival.assignment.status, AssignmentStatus::Arrived);
        assert_eq!(arrival.phase, Some(TripPhase::ToHospital));

        let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::InProgress);

        // Sitting at the scene does not re-fire arrival; the trip is
        // pointed at the hospital now.
        let lingering = world
            .tracking
            .record_position(assignment.id, Coordinate::new(19.0765, 72.8777))
            .await
            .unwrap();
        assert!(!lingering.auto_arrival);
        assert_eq!(lingering.assignment.status, AssignmentStatus::Arrived);
        assert_eq!(lingering.phase, Some(TripPhase::ToHospital));
    }

    #[tokio::test]
    async fn delivery_completes_trip_and_incident() {
        let world = world();
        let (incident, _, assignment) = assigned_incident(&world).await;

        world
            .tracking
            .record_position(assignment.id, Coordinate::new(19.3460, 72.8777))
            .await
            .unwrap();
        world
            .tracking
            .record_position(assignment.id, mumbai())
            .await
            .unwrap();

        // Pulling into the hospital.
        let delivery = world
            .tracking
            .record_position(assignment.id, hospital_location())
            .await
            .unwrap();
        assert!(delivery.auto_arrival);
        assert_eq!(delivery.assignment.status, AssignmentStatus::Completed);
        assert_eq!(delivery.phase, Some(TripPhase::Completed));

        let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::Completed);

        let all = world.repos.notifications.get_all().await.unwrap();
        assert!(all
            .iter()
            .any(|n| n.kind == NotificationKind::PatientDelivered));
    }

    #[tokio::test]
    async fn manual_progress_walks_the_same_path() {
        let world = world();
        let (incident, _, assignment) = assigned_incident(&world).await;

        // No position stream at all; the responder taps through.
        let arrived = world.tracking.progress(assignment.id).await.unwrap();
        assert_eq!(arrived.status, AssignmentStatus::Arrived);
        assert_eq!(
            world
                .repos
                .incidents
                .get_by_id(incident.id)
                .await
                .unwrap()
                .status,
            IncidentStatus::InProgress
        );

        let completed = world.tracking.progress(assignment.id).await.unwrap();
        assert_eq!(completed.status, AssignmentStatus::Completed);
        assert_eq!(
            world
                .repos
                .incidents
                .get_by_id(incident.id)
                .await
                .unwrap()
                .status,
            IncidentStatus::Completed
        );

        // Progressing a finished trip changes nothing.
        let again = world.tracking.progress(assignment.id).await.unwrap();
        assert_eq!(again.status, AssignmentStatus::Completed);
    }

    #[tokio::test]
    async fn pings_after_completion_are_acknowledged_without_effect() {
        let world = world();
        let (_, _, assignment) = assigned_incident(&world).await;

        world.tracking.progress(assignment.id).await.unwrap();
        world.tracking.progress(assignment.id).await.unwrap();

        let update = world
            .tracking
            .record_position(assignment.id, mumbai())
            .await
            .unwrap();
        assert_eq!(update.assignment.status, AssignmentStatus::Completed);
        assert!(!update.auto_arrival);

        let stored = world
            .repos
            .assignments
            .get_by_id(assignment.id)
            .await
            .unwrap();
        assert_ne!(stored.last_location, Some(mumbai()));
    }

    #[tokio::test]
    async fn tracking_a_cancelled_assignment_is_rejected() {
        let world = world();
        let (_, _, assignment) = assigned_incident(&world).await;

        world
            .dispatch
            .cancel_assignment(assignment.id, "vehicle breakdown")
            .await
            .unwrap();

        let err = world
            .tracking
            .record_position(assignment.id, mumbai())
            .await
            .unwrap_err();
        assert!(error::is_invalid_transition(&err));
    }

    fn detector_world() -> (World, Arc<SensorDetector>) {
        let world = world();
        let notifier = create_notifier(world.repos.notifications.clone());
        let detector = Arc::new(SensorDetector::new(
            world.repos.detections.clone(),
            world.dispatch.clone(),
            notifier,
            DetectorConfig::default(),
        ));
        (world, detector)
    }

    fn calm_snapshot(location: Coordinate) -> SensorSnapshot {
        SensorSnapshot {
            device_id: "vehicle-unit-01".into(),
            temperature: 24.0,
            humidity: 60.0,
            gas_level: 100_000.0,
            location,
            speed_kmh: 40.0,
            acceleration: Axes {
                x: 0.0,
                y: 0.0,
                z: 1.0,
            },
            rotation: Axes::default(),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn thresholds_map_to_severities() {
        let (_world, detector) = detector_world();

        let mut high_gas = calm_snapshot(mumbai());
        high_gas.gas_level = 15_000_000.0;
        let hits = detector.evaluate(&high_gas);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].trigger, TriggerKind::Gas);
        assert_eq!(hits[0].severity, Severity::High);

        let mut critical_gas = calm_snapshot(mumbai());
        critical_gas.gas_level = 25_000_000.0;
        assert_eq!(detector.evaluate(&critical_gas)[0].severity, Severity::Critical);

        let mut hot = calm_snapshot(mumbai());
        hot.temperature = 65.0;
        assert_eq!(detector.evaluate(&hot)[0].severity, Severity::High);
        hot.temperature = 85.0;
        assert_eq!(detector.evaluate(&hot)[0].severity, Severity::Critical);

        let mut crash = calm_snapshot(mumbai());
        crash.acceleration = Axes {
            x: 4.0,
            y: 0.0,
            z: 0.0,
        };
        assert_eq!(detector.evaluate(&crash)[0].trigger, TriggerKind::Impact);
        assert_eq!(detector.evaluate(&crash)[0].severity, Severity::High);
        crash.acceleration = Axes {
            x: 6.0,
            y: 0.0,
            z: 0.0,
        };
        assert_eq!(detector.evaluate(&crash)[0].severity, Severity::Critical);

        let mut stopped = calm_snapshot(mumbai());
        stopped.speed_kmh = 2.0;
        let hits = detector.evaluate(&stopped);
        assert_eq!(hits[0].trigger, TriggerKind::SuddenStop);
        assert_eq!(hits[0].severity, Severity::Medium);

        assert!(detector.evaluate(&calm_snapshot(mumbai())).is_empty());
    }

    #[tokio::test]
    async fn detection_raises_a_linked_incident() {
        let (world, detector) = detector_world();
        world
            .repos
            .hospitals
            .create(hospital_at("City General", hospital_location()))
            .await
            .unwrap();

        let mut snapshot = calm_snapshot(mumbai());
        snapshot.gas_level = 25_000_000.0;

        let fired = detector.process(snapshot).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].status, DetectionStatus::Processed);

        let incident_id = fired[0].incident_id.expect("detection must link its incident");
        let incident = world.repos.incidents.get_by_id(incident_id).await.unwrap();
        assert_eq!(incident.severity, Severity::Critical);
        assert_eq!(incident.injured_count, 1);
        assert_eq!(incident.vehicle_count, 1);
        assert_eq!(incident.reporter_id, "sensor-gateway");
        assert_eq!(incident.contact_phone.as_deref(), Some("+910000000000"));
        assert_eq!(incident.status, IncidentStatus::HospitalNotified);
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_triggers() {
        let (world, detector) = detector_world();

        let mut snapshot = calm_snapshot(mumbai());
        snapshot.gas_level = 25_000_000.0;

        let first = detector.process(snapshot.clone()).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = detector.process(snapshot).await.unwrap();
        assert!(second.is_empty(), "cooldown must swallow the repeat");

        assert_eq!(world.repos.detections.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn origin_gps_leaves_the_detection_unlinked() {
        let (world, detector) = detector_world();

        let mut snapshot = calm_snapshot(Coordinate::new(0.0, 0.0));
        snapshot.gas_level = 25_000_000.0;

        let fired = detector.process(snapshot).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].status, DetectionStatus::Detected);
        assert!(fired[0].incident_id.is_none());

        assert!(world.repos.incidents.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn monitor_skips_partial_samples() {
        let (world, detector) = detector_world();
        let (sender, source) = ChannelTelemetrySource::new(16);
        let monitor = SensorMonitor::new(source, detector, 1);

        // Missing gas reading: must be skipped, not read as zero.
        let mut partial = crate::db::models::detection_models::RawTelemetry {
            device_id: Some("vehicle-unit-01".into()),
            temperature: Some(24.0),
            humidity: Some(60.0),
            gas_level: None,
            latitude: Some(19.0760),
            longitude: Some(72.8777),
            speed_kmh: Some(40.0),
            acceleration: Some(Axes {
                x: 0.0,
                y: 0.0,
                z: 1.0,
            }),
            rotation: Some(Axes::default()),
            recorded_at: Some(Utc::now()),
        };
        sender.send(partial.clone()).await.unwrap();

        // The same sample completed, with an alarming reading.
        partial.gas_level = Some(25_000_000.0);
        sender.send(partial).await.unwrap();

        monitor.drain_source().await.unwrap();

        let detections = world.repos.detections.get_all().await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].trigger, TriggerKind::Gas);
    }

    #[tokio::test]
    async fn end_to_end_dispatch_flow() {
        let world = world();
        let hospital = world
            .repos
            .hospitals
            .create(hospital_at("City General", hospital_location()))
            .await
            .unwrap();
        world
            .repos
            .hospitals
            .create(hospital_at("Upstate Medical", distant_hospital_location()))
            .await
            .unwrap();

        let incident = world
            .dispatch
            .report_incident(report_at(mumbai()))
            .await
            .unwrap();
        assert_eq!(incident.status, IncidentStatus::HospitalNotified);

        world
            .dispatch
            .hospital_respond(incident.id, acceptance(hospital.id))
            .await
            .unwrap();

        let assignment = world
            .dispatch
            .accept_by_responder(incident.id, "resp-1", hospital.id)
            .await
            .unwrap();

        world
            .tracking
            .record_position(assignment.id, Coordinate::new(19.3460, 72.8777))
            .await
            .unwrap();
        world
            .tracking
            .record_position(assignment.id, mumbai())
            .await
            .unwrap();
        world
            .tracking
            .record_position(assignment.id, hospital_location())
            .await
            .unwrap();

        let incident = world.repos.incidents.get_by_id(incident.id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::Completed);

        let reporter_inbox = world
            .repos
            .notifications
            .get_for_recipient(crate::messaging::event::RecipientKind::Reporter, "user-17")
            .await
            .unwrap();
        let kinds: Vec<&NotificationKind> = reporter_inbox.iter().map(|n| &n.kind).collect();
        for expected in [
            NotificationKind::IncidentReported,
            NotificationKind::HospitalAccepted,
            NotificationKind::ResponderAssigned,
            NotificationKind::ResponderArrived,
            NotificationKind::PatientDelivered,
        ] {
            assert!(kinds.contains(&&expected), "reporter missing {}", expected);
        }
    }
}
