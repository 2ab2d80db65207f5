use crate::api::rest::{ApiResult, AppState};
use crate::db::models::assignment_models::{Assignment, RejectionRecord};
use crate::geo::Coordinate;
use crate::services::tracking::TrackingUpdate;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

/// Body for claiming an incident
#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub responder_id: String,
    pub hospital_id: Uuid,
}

/// Body for declining an incident
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub responder_id: String,
    pub reason: Option<String>,
}

/// Body for withdrawing from an assignment
#[derive(Debug, Deserialize)]
pub struct CancelAssignmentRequest {
    pub reason: String,
}

/// Body for a position ping
#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    pub latitude: f64,
    pub longitude: f64,
}

/// Query filter for the assignment list
#[derive(Debug, Deserialize)]
pub struct ListAssignmentsParams {
    pub responder_id: Option<String>,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/incidents/:id/accept", post(accept_incident))
        .route("/api/incidents/:id/reject", post(reject_incident))
        .route("/api/assignments", get(list_assignments))
        .route("/api/assignments/:id", get(get_assignment))
        .route("/api/assignments/:id/cancel", post(cancel_assignment))
        .route("/api/assignments/:id/progress", post(progress_assignment))
        .route("/api/assignments/:id/position", post(record_position))
}

/// Claim an incident for a responder. First claim wins.
async fn accept_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AcceptRequest>,
) -> ApiResult<Json<Assignment>> {
    let assignment = state
        .dispatch
        .accept_by_responder(id, &request.responder_id, request.hospital_id)
        .await?;
    Ok(Json(assignment))
}

async fn reject_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> ApiResult<Json<RejectionRecord>> {
    let rejection = state
        .dispatch
        .reject_by_responder(id, &request.responder_id, request.reason)
        .await?;
    Ok(Json(rejection))
}

async fn list_assignments(
    State(state): State<AppState>,
    Query(params): Query<ListAssignmentsParams>,
) -> ApiResult<Json<Vec<Assignment>>> {
    let assignments = if let Some(responder_id) = params.responder_id {
        state
            .repos
            .assignments
            .get_by_responder(&responder_id)
            .await?
    } else {
        state.repos.assignments.get_all().await?
    };

    Ok(Json(assignments))
}

async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Assignment>> {
    let assignment = state.repos.assignments.get_by_id(id).await?;
    Ok(Json(assignment))
}

/// Withdraw from a trip. The incident goes back to the claim pool.
async fn cancel_assignment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelAssignmentRequest>,
) -> ApiResult<Json<Assignment>> {
    let assignment = state
        .dispatch
        .cancel_assignment(id, &request.reason)
        .await?;
    Ok(Json(assignment))
}

/// Manually advance the trip to its next leg
async fn progress_assignment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Assignment>> {
    let assignment = state.tracking.progress(id).await?;
    Ok(Json(assignment))
}

/// Record a live position ping for an assignment
async fn record_position(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PositionRequest>,
) -> ApiResult<Json<TrackingUpdate>> {
    let position = Coordinate::new(request.latitude, request.longitude);
    let update = state.tracking.record_position(id, position).await?;
    Ok(Json(update))
}
