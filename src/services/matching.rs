use crate::config::MatchingConfig;
use crate::db::document::DocumentStore;
use crate::db::models::hospital_models::Hospital;
use crate::db::models::incident_models::Incident;
use crate::db::repositories::{HospitalsRepository, IncidentsRepository};
use crate::geo::{self, Coordinate};
use anyhow::Result;
use log::{debug, info};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

/// A hospital within search range of a point.
#[derive(Debug, Clone, Serialize)]
pub struct HospitalMatch {
    pub hospital: Hospital,
    pub distance_km: f64,
}

/// An incident within search range of a point.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentMatch {
    pub incident: Incident,
    pub distance_km: f64,
}

/// Matching service for radius searches between incidents and hospitals
pub struct MatchingService {
    hospitals_repo: HospitalsRepository,
    incidents_repo: IncidentsRepository,
    config: MatchingConfig,
}

impl MatchingService {
    /// Create a new matching service
    pub fn new(store: Arc<dyn DocumentStore>, config: MatchingConfig) -> Self {
        Self {
            hospitals_repo: HospitalsRepository::new(store.clone()),
            incidents_repo: IncidentsRepository::new(store),
            config,
        }
    }

    /// Hospitals within `radius_km` of a point, nearest first. The
    /// candidate list is scanned in registration order and the sort is
    /// stable, so equal distances keep that order.
    pub async fn nearby_hospitals(
        &self,
        center: Coordinate,
        radius_km: Option<f64>,
    ) -> Result<Vec<HospitalMatch>> {
        center.validate()?;
        let radius = radius_km.unwrap_or(self.config.initial_radius_km);

        let mut matches: Vec<HospitalMatch> = self
            .hospitals_repo
            .get_all()
            .await?
            .into_iter()
            .filter_map(|hospital| {
                let distance_km = geo::distance_km(center, hospital.location);
                (distance_km <= radius).then_some(HospitalMatch {
                    hospital,
                    distance_km,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
        });

        debug!(
            "Found {} hospitals within {} km of ({}, {})",
            matches.len(),
            radius,
            center.latitude,
            center.longitude
        );

        Ok(matches)
    }

    /// Hospitals for a fresh incident: search at the initial radius,
    /// then widen once to the fallback radius if nothing was in range.
    /// Returns the matches and the radius that produced them.
    pub async fn hospitals_for_incident(
        &self,
        incident: &Incident,
    ) -> Result<(Vec<HospitalMatch>, f64)> {
        let initial = self.config.initial_radius_km;
        let matches = self
            .nearby_hospitals(incident.location, Some(initial))
            .await?;
        if !matches.is_empty() {
            return Ok((matches, initial));
        }

        let fallback = self.config.fallback_radius_km;
        info!(
            "No hospitals within {} km of incident {}, widening search to {} km",
            initial, incident.id, fallback
        );

        let matches = self
            .nearby_hospitals(incident.location, Some(fallback))
            .await?;
        Ok((matches, fallback))
    }

    /// Open incidents within `radius_km` of a point, nearest first.
    /// Completed and cancelled incidents are left out; ties keep
    /// creation order.
    pub async fn nearby_incidents(
        &self,
        center: Coordinate,
        radius_km: Option<f64>,
    ) -> Result<Vec<IncidentMatch>> {
        center.validate()?;
        let radius = radius_km.unwrap_or(self.config.initial_radius_km);

        let mut matches: Vec<IncidentMatch> = self
            .incidents_repo
            .get_all()
            .await?
            .into_iter()
            .filter(|incident| !incident.status.is_terminal())
            .filter_map(|incident| {
                let distance_km = geo::distance_km(center, incident.location);
                (distance_km <= radius).then_some(IncidentMatch {
                    incident,
                    distance_km,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
        });

        Ok(matches)
    }
}
