use axum::Json;
use axum::extract::{Path, State};
use hookline_core::{DeliveryId, DeliveryResult, WebhookDelivery};
use hookline_gateway::DispatcherStats;

use crate::error::ServerError;

use super::AppState;
use super::schemas::CancelRequest;

const DEFAULT_CANCEL_REASON: &str = "cancelled via API";

/// `GET /v1/deliveries/{id}`
pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WebhookDelivery>, ServerError> {
    let delivery = state.dispatcher.get_delivery(&DeliveryId::new(id)).await?;
    Ok(Json(delivery))
}

/// `POST /v1/deliveries/{id}/retry` -- attempt now, ahead of schedule.
///
/// Terminal deliveries answer 409.
pub async fn retry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryResult>, ServerError> {
    let result = state.dispatcher.retry(&DeliveryId::new(id)).await?;
    Ok(Json(result))
}

/// `POST /v1/deliveries/{id}/cancel` -- body `{"reason": "..."}` is optional.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<DeliveryResult>, ServerError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let reason = request.reason.as_deref().unwrap_or(DEFAULT_CANCEL_REASON);
    let result = state
        .dispatcher
        .cancel(&DeliveryId::new(id), reason)
        .await?;
    Ok(Json(result))
}

/// `GET /v1/stats` -- delivery counts by status, counters and breakers.
pub async fn stats(State(state): State<AppState>) -> Result<Json<DispatcherStats>, ServerError> {
    Ok(Json(state.dispatcher.stats().await?))
}
