use std::time::Duration;

use axum::Json;
use axum::extract::State;
use hookline_core::{CircuitBreakerActionResponse, ListCircuitBreakersResponse};
use tracing::info;

use crate::error::ServerError;

use super::AppState;
use super::schemas::{CloseCircuitRequest, OpenCircuitRequest};

/// `GET /admin/circuit-breakers` -- every known destination and its state.
pub async fn list_circuit_breakers(
    State(state): State<AppState>,
) -> Json<ListCircuitBreakersResponse> {
    Json(ListCircuitBreakersResponse {
        circuit_breakers: state.dispatcher.circuit_breakers().snapshots(),
    })
}

/// `POST /admin/circuit-breakers/open` -- force a destination open for a
/// fixed duration.
pub async fn open_circuit_breaker(
    State(state): State<AppState>,
    Json(request): Json<OpenCircuitRequest>,
) -> Result<Json<CircuitBreakerActionResponse>, ServerError> {
    if request.duration_seconds == 0 {
        return Err(ServerError::BadRequest(
            "duration_seconds must be greater than zero".into(),
        ));
    }
    let status = state.dispatcher.force_open(
        &request.destination,
        Duration::from_secs(request.duration_seconds),
    );
    info!(
        destination = %status.destination,
        duration_seconds = request.duration_seconds,
        "circuit breaker manually opened"
    );
    Ok(Json(CircuitBreakerActionResponse {
        destination: status.destination,
        state: status.state,
        message: format!("circuit opened for {}s", request.duration_seconds),
    }))
}

/// `POST /admin/circuit-breakers/close` -- force a destination closed.
pub async fn close_circuit_breaker(
    State(state): State<AppState>,
    Json(request): Json<CloseCircuitRequest>,
) -> Result<Json<CircuitBreakerActionResponse>, ServerError> {
    let status = state
        .dispatcher
        .force_close(&request.destination)
        .ok_or_else(|| {
            ServerError::NotFound(format!("circuit breaker not found: {}", request.destination))
        })?;
    info!(destination = %status.destination, "circuit breaker manually closed");
    Ok(Json(CircuitBreakerActionResponse {
        destination: status.destination,
        state: status.state,
        message: "circuit breaker closed".into(),
    }))
}
