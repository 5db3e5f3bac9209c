use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::error::ServerError;

use super::AppState;
use super::schemas::{PublishRequest, PublishResponse};

/// `POST /v1/events` -- fan an event out to every matching subscription.
///
/// Deliveries run in the background; the response lists their ids.
pub async fn publish(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), ServerError> {
    if request.event_type.trim().is_empty() {
        return Err(ServerError::BadRequest("event_type must not be empty".into()));
    }
    let delivery_ids = state
        .dispatcher
        .publish(&request.event_type, request.payload)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { delivery_ids })))
}
