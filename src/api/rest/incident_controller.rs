use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::hospital_models::HospitalResponse;
use crate::db::models::incident_models::{Incident, IncidentStatus, NewIncident};
use crate::geo::Coordinate;
use crate::services::matching::IncidentMatch;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

/// Query filters for the incident list
#[derive(Debug, Deserialize)]
pub struct ListIncidentsParams {
    pub reporter_id: Option<String>,
    pub status: Option<String>,
}

/// Query parameters for the nearby search
#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: Option<f64>,
    pub status: Option<String>,
}

/// Body for cancelling an incident
#[derive(Debug, Deserialize)]
pub struct CancelIncidentRequest {
    pub reason: Option<String>,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/incidents", post(report_incident))
        .route("/api/incidents", get(list_incidents))
        .route("/api/incidents/nearby", get(nearby_incidents))
        .route("/api/incidents/:id", get(get_incident))
        .route("/api/incidents/:id", delete(delete_incident))
        .route("/api/incidents/:id/cancel", post(cancel_incident))
        .route("/api/incidents/:id/responses", get(list_responses))
}

fn parse_status(raw: &str) -> Result<IncidentStatus, ApiError> {
    IncidentStatus::parse(raw)
        .ok_or_else(|| ApiError::bad_request(format!("unknown incident status: {}", raw)))
}

/// Report a new emergency
async fn report_incident(
    State(state): State<AppState>,
    Json(new_incident): Json<NewIncident>,
) -> ApiResult<Json<Incident>> {
    let incident = state.dispatch.report_incident(new_incident).await?;
    Ok(Json(incident))
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(params): Query<ListIncidentsParams>,
) -> ApiResult<Json<Vec<Incident>>> {
    let incidents = if let Some(reporter_id) = params.reporter_id {
        state.repos.incidents.get_by_reporter(&reporter_id).await?
    } else if let Some(raw) = params.status {
        let status = parse_status(&raw)?;
        state.repos.incidents.get_by_status(status).await?
    } else {
        state.repos.incidents.get_all().await?
    };

    Ok(Json(incidents))
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Incident>> {
    let incident = state.repos.incidents.get_by_id(id).await?;
    Ok(Json(incident))
}

/// Remove an incident that has not been accepted yet
async fn delete_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Incident>> {
    let incident = state.dispatch.delete_incident(id).await?;
    Ok(Json(incident))
}

async fn cancel_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelIncidentRequest>,
) -> ApiResult<Json<Incident>> {
    let incident = state.dispatch.cancel_incident(id, request.reason).await?;
    Ok(Json(incident))
}

/// Open incidents around a point, nearest first
async fn nearby_incidents(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> ApiResult<Json<Vec<IncidentMatch>>> {
    let center = Coordinate::new(params.latitude, params.longitude);
    let mut matches = state
        .matching
        .nearby_incidents(center, params.radius_km)
        .await?;

    if let Some(raw) = params.status {
        let status = parse_status(&raw)?;
        matches.retain(|m| m.incident.status == status);
    }

    Ok(Json(matches))
}

async fn list_responses(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<HospitalResponse>>> {
    // A missing incident is 404, not an empty list.
    state.repos.incidents.get_by_id(id).await?;
    let responses = state.repos.hospital_responses.get_for_incident(id).await?;
    Ok(Json(responses))
}
