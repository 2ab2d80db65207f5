use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::db::models::detection_models::{DetectionRecord, RawTelemetry};
use crate::db::models::notification_models::Notification;
use crate::messaging::RecipientKind;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Acknowledgement for a pushed telemetry sample
#[derive(Debug, Serialize)]
pub struct TelemetryAck {
    pub queued: bool,
}

/// Query filter for the detection list
#[derive(Debug, Deserialize)]
pub struct ListDetectionsParams {
    pub device_id: Option<String>,
}

/// Query filters for the notification list
#[derive(Debug, Deserialize)]
pub struct ListNotificationsParams {
    pub recipient: Option<RecipientKind>,
    pub recipient_id: Option<String>,
    pub incident_id: Option<Uuid>,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/telemetry", post(push_telemetry))
        .route("/api/detections", get(list_detections))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/read", post(mark_notification_read))
}

/// Queue a raw sensor sample for the monitor. The sample is evaluated
/// asynchronously; a detection shows up under /api/detections.
async fn push_telemetry(
    State(state): State<AppState>,
    Json(sample): Json<RawTelemetry>,
) -> ApiResult<(StatusCode, Json<TelemetryAck>)> {
    state.telemetry_tx.send(sample).await.map_err(|_| ApiError {
        message: "telemetry channel is closed".to_string(),
        status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
    })?;

    Ok((StatusCode::ACCEPTED, Json(TelemetryAck { queued: true })))
}

async fn list_detections(
    State(state): State<AppState>,
    Query(params): Query<ListDetectionsParams>,
) -> ApiResult<Json<Vec<DetectionRecord>>> {
    let detections = if let Some(device_id) = params.device_id {
        state.repos.detections.get_by_device(&device_id).await?
    } else {
        state.repos.detections.get_all().await?
    };

    Ok(Json(detections))
}

async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<ListNotificationsParams>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = match (params.recipient, params.recipient_id) {
        (Some(recipient), Some(recipient_id)) => {
            state
                .repos
                .notifications
                .get_for_recipient(recipient, &recipient_id)
                .await?
        }
        (None, None) => {
            if let Some(incident_id) = params.incident_id {
                state
                    .repos
                    .notifications
                    .get_for_incident(incident_id)
                    .await?
            } else {
                state.repos.notifications.get_all().await?
            }
        }
        _ => {
            return Err(ApiError::bad_request(
                "recipient and recipient_id go together",
            ))
        }
    };

    Ok(Json(notifications))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    let notification = state.repos.notifications.mark_read(id).await?;
    Ok(Json(notification))
}
