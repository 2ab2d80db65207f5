use crate::api::rest::{ApiResult, AppState};
use crate::db::models::hospital_models::{
    Hospital, HospitalResponse, NewHospital, NewHospitalResponse,
};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use uuid::Uuid;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/hospitals", post(register_hospital))
        .route("/api/hospitals", get(list_hospitals))
        .route("/api/incidents/:id/response", post(respond_to_incident))
}

async fn register_hospital(
    State(state): State<AppState>,
    Json(new_hospital): Json<NewHospital>,
) -> ApiResult<Json<Hospital>> {
    let hospital = state.repos.hospitals.create(new_hospital).await?;
    info!("Registered hospital {} ({})", hospital.name, hospital.id);
    Ok(Json(hospital))
}

async fn list_hospitals(State(state): State<AppState>) -> ApiResult<Json<Vec<Hospital>>> {
    let hospitals = state.repos.hospitals.get_all().await?;
    Ok(Json(hospitals))
}

/// A hospital accepts or declines an incident it was notified about
async fn respond_to_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(answer): Json<NewHospitalResponse>,
) -> ApiResult<Json<HospitalResponse>> {
    let response = state.dispatch.hospital_respond(id, answer).await?;
    Ok(Json(response))
}
